//! Stubby: an HTTP gateway that forwards, records or replays upstream traffic.

pub mod admin_api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod recording;

pub use config::{Config, Target, Targets, TargetsFile};
pub use error::{GatewayError, Result};
pub use proxy::{GatewayServer, GatewayState};
pub use recording::{GatewayMode, ModeController};
