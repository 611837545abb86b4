//! Error types shared by the recording, replay and capture paths.

use std::path::PathBuf;

/// Errors surfaced by the gateway core.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid profile name: {0:?}")]
    InvalidProfile(String),

    /// One or more stub files of a profile could not be read or decoded.
    #[error("failed to load profile {profile}: {}", .causes.join("\n"))]
    ProfileLoad { profile: String, causes: Vec<String> },

    #[error("unsupported value type for query key {key}: {kind}")]
    UnsupportedQueryValueType { key: String, kind: &'static str },

    #[error("content-type {0} cannot be recorded, only application/json and text/plain are supported")]
    UnsupportedContentType(String),

    #[error("failed to decompress gzip body: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("failed to unmarshal body to JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("failed to write stub file {}: {reason}", .path.display())]
    FileWrite { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub(crate) fn file_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        GatewayError::FileWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
