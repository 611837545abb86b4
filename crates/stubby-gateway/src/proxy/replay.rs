//! Responses reconstructed from recorded exchanges.

use super::forwarding::{error_response, full_body, GatewayBody};
use super::headers::{StubbyHeadersExt, VALUE_JSON, VALUE_TRUE, X_STUBBY_PROFILE, X_STUBBY_REPLAYED};
use crate::recording::{to_indented_json, Record};
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde_json::Value;
use tracing::error;

/// Build the client response for a replayed `record`.
///
/// Plain-text captures are written back verbatim with their stored content
/// type. Every other body is re-serialized as tab-indented JSON.
pub fn replay_response(record: &Record, profile: &str) -> Response<GatewayBody> {
    let snapshot = &record.response;
    let Ok(status) = StatusCode::from_u16(snapshot.status_code) else {
        error!(
            http.status_code = snapshot.status_code,
            http.path = %record.request.pathname,
            "stored status code is not valid"
        );
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid stored status code");
    };

    let mut response = match (&snapshot.content_type, &snapshot.body) {
        (Some(content_type), Value::String(text)) => {
            let mut response = Response::new(full_body(text.clone()));
            if !response.set_header_value(&CONTENT_TYPE, content_type) {
                response.set_header(&CONTENT_TYPE, &VALUE_JSON);
            }
            response
        }
        _ => match to_indented_json(&snapshot.body) {
            Ok(encoded) => {
                let mut response = Response::new(full_body(encoded));
                response.set_header(&CONTENT_TYPE, &VALUE_JSON);
                response
            }
            Err(e) => {
                error!("failed to encode stored body: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode stored body");
            }
        },
    };

    *response.status_mut() = status;
    response.set_header(&X_STUBBY_REPLAYED, &VALUE_TRUE);
    response.set_header_value(&X_STUBBY_PROFILE, profile);
    response
}
