//! Header names the gateway adds or strips.
//!
//! Names and values are built with `from_static` so call sites never parse
//! header strings at runtime.

use hyper::header::{
    HeaderName, HeaderValue, CACHE_CONTROL, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    IF_UNMODIFIED_SINCE, PRAGMA,
};
use hyper::{HeaderMap, Response};

pub static X_STUBBY_REPLAYED: HeaderName = HeaderName::from_static("x-stubby-replayed");
pub static X_STUBBY_PROFILE: HeaderName = HeaderName::from_static("x-stubby-profile");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");
pub static VALUE_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Validators that would let the upstream answer 304 instead of a full body.
const CACHE_VALIDATION_HEADERS: [HeaderName; 6] = [
    IF_MODIFIED_SINCE,
    IF_UNMODIFIED_SINCE,
    IF_MATCH,
    IF_NONE_MATCH,
    CACHE_CONTROL,
    PRAGMA,
];

/// Remove cache-validation headers from an inbound request.
pub fn strip_cache_validation(headers: &mut HeaderMap) {
    for name in &CACHE_VALIDATION_HEADERS {
        headers.remove(name);
    }
}

/// Insert gateway headers into responses.
pub trait StubbyHeadersExt {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Returns false if `value` is not a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> StubbyHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}
