//! Forwarding of requests to their upstream target.

use super::client::HttpClient;
use super::headers::{StubbyHeadersExt, VALUE_JSON};
use crate::metrics;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, error};

pub type GatewayBody = BoxBody<Bytes, hyper::Error>;

pub fn full_body(bytes: impl Into<Bytes>) -> GatewayBody {
    Full::new(bytes.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}

pub fn empty_body() -> GatewayBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// `{"error": "<message>"}` with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response<GatewayBody> {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response.set_header(&CONTENT_TYPE, &VALUE_JSON);
    response
}

/// Empty 200 answered to ignored paths.
pub fn empty_ok() -> Response<GatewayBody> {
    Response::new(empty_body())
}

/// Send an already routed request upstream.
///
/// The response body is returned unread so it can stream to the client.
pub async fn forward_request(
    http_client: &HttpClient,
    req: Request<GatewayBody>,
) -> Result<Response<Incoming>, hyper_util::client::legacy::Error> {
    let method = req.method().clone();
    debug!("Forwarding to: {}", req.uri());

    let start = Instant::now();
    let result = http_client.request(req).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    match &result {
        Ok(response) => {
            metrics::record_upstream_duration(method.as_str(), response.status().as_u16(), duration_ms)
        }
        Err(e) => {
            error!("Failed to forward request to upstream: {}", e);
            metrics::record_upstream_duration(method.as_str(), 502, duration_ms);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_response_body() {
        let response = error_response(StatusCode::BAD_GATEWAY, "Bad \"Gateway\"");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["error"], "Bad \"Gateway\"");
    }

    #[tokio::test]
    async fn test_empty_ok() {
        let response = empty_ok();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
