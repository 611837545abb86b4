//! Control endpoints served on the gateway listener under `/_/`.
//!
//! - `POST /_/record/{profile}` - start recording into a profile
//! - `POST /_/replay/{profile}` - load a profile and start replaying it
//! - `POST /_/forward` - plain forwarding
//! - `GET /_/status` - current `{profile, status, targets}`
//! - `GET /_/metrics` - Prometheus exposition

mod handlers;
mod router;
mod types;

pub use router::{is_control_path, route_request, CONTROL_PREFIX};
pub use types::StatusResponse;
