//! Per-request handling: skip, control, replay, forward and record.

use super::capture::{capture_response, CapturedResponse};
use super::client::{create_http_client, HttpClient};
use super::forwarding::{empty_ok, error_response, forward_request, GatewayBody};
use super::headers::strip_cache_validation;
use super::replay::replay_response;
use crate::admin_api;
use crate::config::{Config, Targets};
use crate::error::Result;
use crate::metrics;
use crate::recording::{
    panic_message, parse_query, spawn_background, to_query_map, GatewayMode, InFlight,
    ModeController, Record, RecordStore, RequestDescriptor, ResponseSnapshot,
};
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Everything a request needs, shared by all connections.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub targets: Arc<Targets>,
    pub modes: Arc<ModeController>,
    pub store: Arc<RecordStore>,
    /// Background capture tasks plus records waiting for a flush.
    pub in_flight: InFlight,
    pub http_client: HttpClient,
}

impl GatewayState {
    pub fn new(config: Config) -> Self {
        let targets = Arc::new(config.targets.clone());
        let in_flight = InFlight::new();
        let modes = Arc::new(ModeController::new(&config.stub_dir, Arc::clone(&targets)));
        let store = Arc::new(RecordStore::new(&config.stub_dir, in_flight.clone()));
        let http_client = create_http_client(&config.connection_pool);

        Self {
            config: Arc::new(config),
            targets,
            modes,
            store,
            in_flight,
            http_client,
        }
    }
}

/// Handle one request. A panic while handling it becomes a 500.
pub async fn handle_request<B>(
    state: Arc<GatewayState>,
    req: Request<B>,
) -> std::result::Result<Response<GatewayBody>, Infallible>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match AssertUnwindSafe(dispatch(&state, req)).catch_unwind().await {
        Ok(response) => Ok(response),
        Err(panic) => {
            error!(
                http.method = %method,
                http.path = %path,
                "requestPanicked: {}",
                panic_message(panic.as_ref())
            );
            metrics::record_request(state.modes.current_mode().as_str(), "error");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

async fn dispatch<B>(state: &GatewayState, mut req: Request<B>) -> Response<GatewayBody>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let path = req.uri().path().to_string();

    if state.config.is_ignored(&path) {
        debug!(http.path = %path, "pathSkipped");
        metrics::record_request(state.modes.current_mode().as_str(), "skipped");
        return empty_ok();
    }

    if admin_api::is_control_path(&path) {
        let response = admin_api::route_request(
            req.method(),
            &path,
            Arc::clone(&state.modes),
            &state.targets,
        )
        .await;
        return response.map(|body| body.map_err(|never: Infallible| match never {}).boxed());
    }

    // Mode is read once; a transition mid-request does not affect this request.
    let snapshot = state.modes.snapshot();
    let mode = snapshot.mode;
    let method = req.method().as_str().to_string();

    if let Some(matcher) = &snapshot.matcher {
        if let Some(record) = matcher.match_request(&req, &state.targets) {
            info!(
                http.method = %method,
                http.path = %path,
                profile = %snapshot.profile,
                http.status_code = record.response.status_code,
                "responseReplayed"
            );
            metrics::record_request(mode.as_str(), "replayed");
            return replay_response(&record, &snapshot.profile);
        }
        debug!(http.method = %method, http.path = %path, "replayMiss");
        metrics::record_replay_miss();
    }

    strip_cache_validation(req.headers_mut());
    let raw_query = req.uri().query().map(str::to_string);
    let host = state.targets.route(&mut req).host().to_string();

    let upstream = match forward_request(&state.http_client, req.map(|body| body.boxed())).await {
        Ok(response) => response,
        Err(_) => {
            metrics::record_request(mode.as_str(), "error");
            return error_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
        }
    };

    info!(
        http.method = %method,
        http.path = %path,
        http.query = raw_query.as_deref().unwrap_or(""),
        http.status_code = upstream.status().as_u16(),
        "responseForwarded"
    );
    metrics::record_request(mode.as_str(), "forwarded");

    if mode != GatewayMode::Recording {
        return upstream.map(|body| body.boxed());
    }

    let request = RequestDescriptor {
        pathname: path.clone(),
        method: method.clone(),
        host: Some(host),
        query: Some(to_query_map(&parse_query(raw_query.as_deref()))),
    };
    let (response, captured) = capture_response(upstream);
    spawn_background(
        &state.in_flight,
        format!("record {method} {path}"),
        record_exchange(Arc::clone(&state.store), snapshot.profile, request, captured),
    );

    response.map(|body| body.boxed())
}

/// Wait until the client has the whole response, then buffer it as a record.
async fn record_exchange(
    store: Arc<RecordStore>,
    profile: String,
    request: RequestDescriptor,
    captured: oneshot::Receiver<CapturedResponse>,
) -> Result<()> {
    let Ok(CapturedResponse { capture, complete }) = captured.await else {
        warn!(http.path = %request.pathname, "recordDropped: capture was lost");
        return Ok(());
    };
    if !complete {
        warn!(
            http.path = %request.pathname,
            "recordDropped: response body did not complete"
        );
        return Ok(());
    }

    let body = capture.body()?;
    let content_type = if capture.is_plain_text() {
        capture.content_type().map(str::to_string)
    } else {
        None
    };

    info!(
        profile = %profile,
        http.method = %request.method,
        http.path = %request.pathname,
        http.status_code = capture.status_code(),
        "responseRecorded"
    );
    store.enqueue(Record {
        profile,
        request,
        response: ResponseSnapshot {
            status_code: capture.status_code(),
            body,
            content_type,
        },
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Target, TargetsFile};
    use http_body_util::Full;
    use hyper::header::CONTENT_TYPE;
    use std::fs;

    fn state(stub_dir: &std::path::Path) -> Arc<GatewayState> {
        // Port 1 refuses connections, so every forward fails fast.
        let targets_file = TargetsFile {
            targets: Targets::new(Target::new("http://127.0.0.1:1", "").unwrap(), vec![]),
            connection_pool: Default::default(),
        };
        Arc::new(GatewayState::new(Config::new(targets_file, stub_dir)))
    }

    fn request(method: &str, uri: &str) -> Request<http_body_util::combinators::BoxBody<Bytes, hyper::Error>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(
                Full::new(Bytes::new())
                    .map_err(|never: Infallible| match never {})
                    .boxed(),
            )
            .unwrap()
    }

    async fn body_string(response: Response<GatewayBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ignored_path_gets_empty_ok() {
        let dir = tempfile::tempdir().unwrap();
        let response = handle_request(state(dir.path()), request("POST", "/otlp/v1/traces"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_control_path_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let response = handle_request(Arc::clone(&state), request("POST", "/_/record/demo"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.modes.current_mode(), GatewayMode::Recording);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let response = handle_request(state(dir.path()), request("GET", "/api/users"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_replay_hit_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("demo")).unwrap();
        fs::write(
            dir.path().join("demo/api--users.json"),
            r#"{"stubs": [
                {"request": {"pathname": "/api/users", "method": "GET"}, "response": {"statusCode": 201, "body": {"a": 1}}},
                {"request": {"pathname": "/api/users", "method": "GET"}, "response": {"statusCode": 200, "body": {"a": 2}}}
            ]}"#,
        )
        .unwrap();

        let state = state(dir.path());
        state.modes.set_replaying("demo").unwrap();

        let first = handle_request(Arc::clone(&state), request("GET", "/api/users?x=1"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(first.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(body_string(first).await, "{\n\t\"a\": 1\n}\n");

        for _ in 0..3 {
            let next = handle_request(Arc::clone(&state), request("GET", "/api/users"))
                .await
                .unwrap();
            assert_eq!(next.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_replay_miss_falls_through_to_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("demo")).unwrap();
        let state = state(dir.path());
        state.modes.set_replaying("demo").unwrap();

        let response = handle_request(state, request("GET", "/not/recorded"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
