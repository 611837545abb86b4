//! Configuration types for the Stubby gateway.

mod protocol;
mod target;
mod upstream;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use protocol::Protocol;
pub use target::{Target, Targets};
pub use upstream::ConnectionPoolConfig;

/// Targets document used when no `--config-file` is given.
const DEFAULT_TARGETS: &str = include_str!("default_targets.json");

/// Path prefixes answered with an empty 200 unless overridden.
pub const DEFAULT_IGNORED_PATHS: &[&str] = &["/otlp", "/gw/otlp", "/api/alerts"];

/// Contents of the targets configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsFile {
    #[serde(flatten)]
    pub targets: Targets,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

impl TargetsFile {
    /// Load a targets document. `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let file = if is_yaml {
            serde_yaml::from_str(&contents)?
        } else {
            Self::from_json(&contents)?
        };
        Ok(file)
    }

    pub fn from_json(contents: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(contents)
            .map_err(|e| anyhow::anyhow!("failed to parse configuration file: {e}"))
    }

    /// The embedded default document.
    pub fn embedded() -> Result<Self, anyhow::Error> {
        Self::from_json(DEFAULT_TARGETS)
    }
}

/// Runtime settings of one gateway instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Informational, reported at startup.
    pub base_url: String,
    /// Root directory holding one subdirectory per profile.
    pub stub_dir: PathBuf,
    pub ignored_paths: Vec<String>,
    pub flush_interval: Duration,
    pub targets: Targets,
    pub connection_pool: ConnectionPoolConfig,
}

impl Config {
    pub fn new(targets_file: TargetsFile, stub_dir: impl Into<PathBuf>) -> Self {
        Self {
            http_port: 4444,
            base_url: "http://localhost:4444".to_string(),
            stub_dir: stub_dir.into(),
            ignored_paths: DEFAULT_IGNORED_PATHS.iter().map(|p| p.to_string()).collect(),
            flush_interval: Duration::from_secs(1),
            targets: targets_file.targets,
            connection_pool: targets_file.connection_pool,
        }
    }

    /// True when `path` falls under one of the ignored prefixes.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_paths
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }
}
