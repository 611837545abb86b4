//! Response types and helpers for the control endpoints.

use crate::config::Targets;
use crate::error::GatewayError;
use crate::recording::{to_indented_json, GatewayMode};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Snapshot returned by every control endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse<'a> {
    pub profile: String,
    pub status: GatewayMode,
    pub targets: &'a Targets,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Tab-indented JSON with a trailing newline.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = to_indented_json(body).unwrap_or_else(|_| b"{}\n".to_vec());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build a response, falling back to a bare 500 if the builder rejects the input.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

/// Map a failed mode transition to its status code.
pub fn gateway_error_response(error: &GatewayError) -> Response<Full<Bytes>> {
    let status = match error {
        GatewayError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
        GatewayError::ProfileLoad { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &error.to_string())
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    #[test]
    fn test_status_response_shape() {
        let targets = Targets::new(
            Target::new("http://up.example", "").unwrap(),
            vec![Target::new("https://svc.example", "/svc").unwrap()],
        );
        let body = StatusResponse {
            profile: "checkout".to_string(),
            status: GatewayMode::Recording,
            targets: &targets,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["profile"], "checkout");
        assert_eq!(value["status"], "Recording");
        assert_eq!(value["targets"]["default"]["url"], "http://up.example");
        assert_eq!(value["targets"]["prefixes"][0]["prefix"], "/svc");
    }

    #[test]
    fn test_gateway_error_status_codes() {
        let invalid = gateway_error_response(&GatewayError::InvalidProfile(String::new()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let load = gateway_error_response(&GatewayError::ProfileLoad {
            profile: "p".to_string(),
            causes: vec!["boom".to_string()],
        });
        assert_eq!(load.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_json_response_headers() {
        let resp = json_response(StatusCode::OK, &serde_json::json!({"a": 1}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_not_found_and_method_not_allowed() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(method_not_allowed().status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
