//! Gateway request path.
//!
//! # Module Structure
//!
//! - `server` - GatewayServer and the accept loop
//! - `handler` - Per-request dispatch across the three modes
//! - `forwarding` - Sending requests upstream, shared response helpers
//! - `replay` - Responses rebuilt from recorded exchanges
//! - `capture` - Tee of upstream responses for recording
//! - `client` - Shared upstream HTTP client
//! - `headers` - Header names added or stripped by the gateway

mod capture;
mod client;
mod forwarding;
mod handler;
mod headers;
mod replay;
mod server;

pub use capture::{capture_response, CaptureBody, CapturedResponse, ResponseCapture};
pub use client::{create_http_client, HttpClient};
pub use forwarding::{error_response, GatewayBody};
pub use handler::{handle_request, GatewayState};
pub use headers::{X_STUBBY_PROFILE, X_STUBBY_REPLAYED};
pub use server::GatewayServer;
