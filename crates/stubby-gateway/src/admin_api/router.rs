//! Route dispatch for the control endpoints under `/_/`.

use super::handlers;
use super::types::{error_response, method_not_allowed, not_found};
use crate::config::Targets;
use crate::recording::ModeController;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Prefix reserved for control endpoints.
pub const CONTROL_PREFIX: &str = "/_/";

/// Parsed control route.
#[derive(Debug, PartialEq, Eq)]
enum ControlRoute<'a> {
    /// POST /_/record/:profile
    Record(&'a str),
    /// POST /_/replay/:profile
    Replay(&'a str),
    /// POST /_/forward
    Forward,
    /// GET /_/status
    Status,
    /// GET /_/metrics
    Metrics,
}

impl<'a> ControlRoute<'a> {
    /// Parse route from the path segments after `/_/`.
    fn parse(segments: &[&'a str]) -> Option<Self> {
        match segments {
            ["record", profile] => Some(ControlRoute::Record(*profile)),
            ["replay", profile] => Some(ControlRoute::Replay(*profile)),
            ["forward"] => Some(ControlRoute::Forward),
            ["status"] => Some(ControlRoute::Status),
            ["metrics"] => Some(ControlRoute::Metrics),
            _ => None,
        }
    }

    fn method(&self) -> Method {
        match self {
            ControlRoute::Status | ControlRoute::Metrics => Method::GET,
            _ => Method::POST,
        }
    }
}

/// True when `path` addresses a control endpoint.
pub fn is_control_path(path: &str) -> bool {
    path.starts_with(CONTROL_PREFIX)
}

/// Dispatch a control request.
pub async fn route_request(
    method: &Method,
    path: &str,
    modes: Arc<ModeController>,
    targets: &Targets,
) -> Response<Full<Bytes>> {
    debug!("Control API: {} {}", method, path);

    let Some(rest) = path.strip_prefix(CONTROL_PREFIX) else {
        return not_found();
    };
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();

    let Some(route) = ControlRoute::parse(&segments) else {
        return not_found();
    };
    if *method != route.method() {
        return method_not_allowed();
    }

    match route {
        ControlRoute::Record(raw) => match decode_profile(raw) {
            Ok(profile) => handlers::handle_record(&modes, targets, &profile),
            Err(response) => response,
        },
        ControlRoute::Replay(raw) => match decode_profile(raw) {
            Ok(profile) => handlers::handle_replay(modes, targets, &profile).await,
            Err(response) => response,
        },
        ControlRoute::Forward => handlers::handle_forward(&modes, targets),
        ControlRoute::Status => handlers::handle_status(&modes, targets),
        ControlRoute::Metrics => handlers::handle_metrics(),
    }
}

fn decode_profile(raw: &str) -> Result<String, Response<Full<Bytes>>> {
    urlencoding::decode(raw)
        .map(|profile| profile.into_owned())
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "profile name is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::recording::GatewayMode;
    use http_body_util::BodyExt;
    use std::fs;

    fn setup(stub_dir: &std::path::Path) -> (Arc<ModeController>, Arc<Targets>) {
        let targets = Arc::new(Targets::new(
            Target::new("http://up.example", "").unwrap(),
            vec![],
        ));
        let modes = Arc::new(ModeController::new(stub_dir, Arc::clone(&targets)));
        (modes, targets)
    }

    async fn json_body(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(
            ControlRoute::parse(&["record", "checkout"]),
            Some(ControlRoute::Record("checkout"))
        );
        assert_eq!(ControlRoute::parse(&["forward"]), Some(ControlRoute::Forward));
        assert_eq!(ControlRoute::parse(&["record"]), None);
        assert_eq!(ControlRoute::parse(&["unknown"]), None);
    }

    #[tokio::test]
    async fn test_record_then_status() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());

        let response =
            route_request(&Method::POST, "/_/record/CheckOut", Arc::clone(&modes), &targets).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "Recording");
        assert_eq!(body["profile"], "checkout");

        let response = route_request(&Method::GET, "/_/status", Arc::clone(&modes), &targets).await;
        let body = json_body(response).await;
        assert_eq!(body["status"], "Recording");
    }

    #[tokio::test]
    async fn test_replay_missing_profile_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());

        let response =
            route_request(&Method::POST, "/_/replay/missing", Arc::clone(&modes), &targets).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["error"].is_string());
        assert_eq!(modes.current_mode(), GatewayMode::Forwarding);
    }

    #[tokio::test]
    async fn test_replay_existing_profile() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("p")).unwrap();
        let (modes, targets) = setup(dir.path());

        let response = route_request(&Method::POST, "/_/replay/p", Arc::clone(&modes), &targets).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(modes.current_mode(), GatewayMode::Replaying);
    }

    #[tokio::test]
    async fn test_invalid_profile_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());

        let response = route_request(&Method::POST, "/_/record/%20", modes, &targets).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forward_clears_profile() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());
        modes.set_recording("p").unwrap();

        let response = route_request(&Method::POST, "/_/forward", Arc::clone(&modes), &targets).await;
        let body = json_body(response).await;
        assert_eq!(body["status"], "Forwarding");
        assert_eq!(body["profile"], "");
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());

        let response = route_request(&Method::GET, "/_/nope", Arc::clone(&modes), &targets).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = route_request(&Method::GET, "/_/forward", Arc::clone(&modes), &targets).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (modes, targets) = setup(dir.path());
        crate::metrics::record_request("Forwarding", "forwarded");

        let response = route_request(&Method::GET, "/_/metrics", modes, &targets).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("stubby_requests_total"));
    }
}
