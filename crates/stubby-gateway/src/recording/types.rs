//! Stored request/response types and the stub file layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Query parameters as stored: a single string or a list of strings per name.
///
/// Stub files written by hand may also carry numbers or booleans.
pub type QueryMap = BTreeMap<String, Value>;

/// Matchable projection of an HTTP request.
///
/// `query` is tri-state: `None` (no query data, matches any query string),
/// `Some(empty)` (explicitly no parameters) or `Some(params)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RequestDescriptor {
    pub pathname: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryMap>,
}

/// Status code plus the reconstructed body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status_code: u16,
    /// Parsed JSON, or the verbatim text of a plain-text response.
    #[serde(default)]
    pub body: Value,
    /// Set only for plain-text captures, which replay verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Record {
    /// Owning profile, implied by the directory the record is stored in.
    #[serde(skip)]
    pub profile: String,
    pub request: RequestDescriptor,
    pub response: ResponseSnapshot,
}

impl Record {
    /// Stub file of this record relative to the stub directory:
    /// `<profile>/<lower-cased path with "/" as "--">.json`.
    pub fn file_path(&self) -> PathBuf {
        let lowered = self.request.pathname.to_lowercase();
        let replaced = lowered.replace('/', "--");
        let normalized = replaced.strip_prefix("--").unwrap_or(&replaced);
        PathBuf::from(&self.profile).join(format!("{normalized}.json"))
    }
}

/// On-disk layout of one stub file: `{"stubs": [...]}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StubFile {
    #[serde(rename = "stubs", default)]
    pub records: Vec<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pathname: &str) -> Record {
        Record {
            profile: "checkout".to_string(),
            request: RequestDescriptor {
                pathname: pathname.to_string(),
                method: "GET".to_string(),
                host: None,
                query: None,
            },
            response: ResponseSnapshot {
                status_code: 200,
                body: json!({}),
                content_type: None,
            },
        }
    }

    #[test]
    fn test_file_path_normalization() {
        assert_eq!(
            record("/API/Users/42").file_path(),
            PathBuf::from("checkout/api--users--42.json")
        );
        assert_eq!(record("/").file_path(), PathBuf::from("checkout/.json"));
    }

    #[test]
    fn test_query_tri_state_deserialization() {
        let absent: RequestDescriptor =
            serde_json::from_value(json!({"pathname": "/a", "method": "GET"})).unwrap();
        let null: RequestDescriptor =
            serde_json::from_value(json!({"pathname": "/a", "method": "GET", "query": null}))
                .unwrap();
        let empty: RequestDescriptor =
            serde_json::from_value(json!({"pathname": "/a", "method": "GET", "query": {}}))
                .unwrap();

        assert_eq!(absent.query, None);
        assert_eq!(null.query, None);
        assert_eq!(empty.query, Some(QueryMap::new()));
    }

    #[test]
    fn test_profile_not_serialized() {
        let value = serde_json::to_value(record("/a")).unwrap();
        assert!(value.get("profile").is_none());
        assert_eq!(value["response"]["statusCode"], 200);
        assert!(value["response"].get("contentType").is_none());
    }
}
