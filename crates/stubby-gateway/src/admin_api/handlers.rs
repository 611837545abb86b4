//! Control endpoint handlers: mode transitions, status and metrics.

use super::types::{build_response_with_headers, gateway_error_response, json_response, StatusResponse};
use crate::config::Targets;
use crate::error::GatewayError;
use crate::metrics;
use crate::recording::ModeController;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{error, warn};

fn status_response(modes: &ModeController, targets: &Targets) -> Response<Full<Bytes>> {
    let snapshot = modes.snapshot();
    json_response(
        StatusCode::OK,
        &StatusResponse {
            profile: snapshot.profile,
            status: snapshot.mode,
            targets,
        },
    )
}

/// POST /_/record/{profile}
pub fn handle_record(modes: &ModeController, targets: &Targets, profile: &str) -> Response<Full<Bytes>> {
    match modes.set_recording(profile) {
        Ok(_) => status_response(modes, targets),
        Err(e) => {
            warn!("failed to start recording: {}", e);
            gateway_error_response(&e)
        }
    }
}

/// POST /_/replay/{profile}
///
/// Loading reads every stub file of the profile, so it runs on the blocking pool.
pub async fn handle_replay(
    modes: Arc<ModeController>,
    targets: &Targets,
    profile: &str,
) -> Response<Full<Bytes>> {
    let loader = Arc::clone(&modes);
    let requested = profile.to_string();
    let result = match tokio::task::spawn_blocking(move || loader.set_replaying(&requested)).await {
        Ok(result) => result,
        Err(e) => {
            error!("profile load task failed: {}", e);
            Err(GatewayError::ProfileLoad {
                profile: profile.to_string(),
                causes: vec![e.to_string()],
            })
        }
    };

    match result {
        Ok(_) => status_response(&modes, targets),
        Err(e) => {
            warn!("failed to start replaying: {}", e);
            gateway_error_response(&e)
        }
    }
}

/// POST /_/forward
pub fn handle_forward(modes: &ModeController, targets: &Targets) -> Response<Full<Bytes>> {
    modes.set_forwarding();
    status_response(modes, targets)
}

/// GET /_/status
pub fn handle_status(modes: &ModeController, targets: &Targets) -> Response<Full<Bytes>> {
    status_response(modes, targets)
}

/// GET /_/metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
}
