//! Record/replay core of the gateway.
//!
//! The gateway is always in one of three modes:
//! - `Forwarding`: proxy to the upstream, record nothing (default)
//! - `Recording`: proxy to the upstream and persist each exchange into the active profile
//! - `Replaying`: answer from the active profile's stub files, proxy on miss
//!
//! # Module Structure
//!
//! - `mode` - Mode state machine and profile switching
//! - `types` - Stored request/response types and stub file layout
//! - `query` - Query string parsing and canonical encoding
//! - `matcher` - Fingerprint index used for replay
//! - `store` - Buffered persistence into stub files
//! - `tasks` - In-flight tracking and background task fault boundary

mod matcher;
mod mode;
mod query;
mod store;
mod tasks;
mod types;

pub use matcher::{fingerprint, Matcher, ANY_QUERY};
pub use mode::{normalize_profile, GatewayMode, ModeController, ModeSnapshot};
pub use query::{encode_map, encode_values, parse_query, to_query_map, QueryValues};
pub use store::{to_indented_json, write_to_file, RecordStore};
pub use tasks::{spawn_background, InFlight};
pub use types::{QueryMap, Record, RequestDescriptor, ResponseSnapshot, StubFile};

pub(crate) use tasks::panic_message;
