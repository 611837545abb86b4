//! Gateway mode state machine: Forwarding, Replaying or Recording.

use super::matcher::Matcher;
use crate::config::Targets;
use crate::error::{GatewayError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// What the gateway does with non-control traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum GatewayMode {
    /// Proxy to the upstream, record nothing
    #[default]
    Forwarding,
    /// Answer from the loaded profile, proxy on miss
    Replaying,
    /// Proxy to the upstream and record every exchange
    Recording,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Forwarding => "Forwarding",
            GatewayMode::Replaying => "Replaying",
            GatewayMode::Recording => "Recording",
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent view of the mode, taken once per request.
#[derive(Clone, Default)]
pub struct ModeSnapshot {
    pub mode: GatewayMode,
    /// Empty while forwarding.
    pub profile: String,
    /// Present only while replaying.
    pub matcher: Option<Arc<Matcher>>,
}

/// Owns the active mode, profile name and replay index.
///
/// Transitions replace all three under one write lock; request paths take a
/// cheap [`ModeSnapshot`] under the read lock.
pub struct ModeController {
    state: RwLock<ModeSnapshot>,
    stub_dir: PathBuf,
    targets: Arc<Targets>,
}

impl ModeController {
    pub fn new(stub_dir: impl Into<PathBuf>, targets: Arc<Targets>) -> Self {
        Self {
            state: RwLock::new(ModeSnapshot::default()),
            stub_dir: stub_dir.into(),
            targets,
        }
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.state.read().clone()
    }

    pub fn current_mode(&self) -> GatewayMode {
        self.state.read().mode
    }

    pub fn current_profile(&self) -> String {
        self.state.read().profile.clone()
    }

    pub fn set_forwarding(&self) {
        self.change(GatewayMode::Forwarding, String::new(), None);
    }

    /// Start recording into `profile` (case-folded). Returns the normalized name.
    pub fn set_recording(&self, profile: &str) -> Result<String> {
        let profile = normalize_profile(profile)?;
        self.change(GatewayMode::Recording, profile.clone(), None);
        Ok(profile)
    }

    /// Load `profile` into a fresh index and start replaying it.
    ///
    /// The profile is loaded before the lock is taken. If loading fails the
    /// current mode is left untouched and the error is returned.
    pub fn set_replaying(&self, profile: &str) -> Result<String> {
        let profile = normalize_profile(profile)?;
        let dir = self.stub_dir.join(&profile);
        debug!(profile = %profile, stub.dir = %dir.display(), "loadingProfile");

        let matcher = Matcher::load_profile(&dir, &profile, &self.targets)?;
        self.change(GatewayMode::Replaying, profile.clone(), Some(Arc::new(matcher)));
        Ok(profile)
    }

    fn change(&self, mode: GatewayMode, profile: String, matcher: Option<Arc<Matcher>>) {
        info!(new = %mode, profile = %profile, "changeStatus");
        let mut state = self.state.write();
        *state = ModeSnapshot {
            mode,
            profile,
            matcher,
        };
    }
}

/// Case-fold a profile name; empty names and names that would escape the stub directory are rejected.
pub fn normalize_profile(profile: &str) -> Result<String> {
    let trimmed = profile.trim();
    if trimmed.is_empty()
        || trimmed.contains(['/', '\\'])
        || trimmed == "."
        || trimmed == ".."
    {
        return Err(GatewayError::InvalidProfile(profile.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use std::fs;

    fn controller(stub_dir: &std::path::Path) -> ModeController {
        let targets = Targets::new(Target::new("http://up.example", "").unwrap(), vec![]);
        ModeController::new(stub_dir, Arc::new(targets))
    }

    #[test]
    fn test_default_is_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let modes = controller(dir.path());
        assert_eq!(modes.current_mode(), GatewayMode::Forwarding);
        assert_eq!(modes.current_profile(), "");
        assert!(modes.snapshot().matcher.is_none());
    }

    #[test]
    fn test_set_recording_folds_case() {
        let dir = tempfile::tempdir().unwrap();
        let modes = controller(dir.path());
        assert_eq!(modes.set_recording("CheckOut").unwrap(), "checkout");
        assert_eq!(modes.current_mode(), GatewayMode::Recording);
        assert_eq!(modes.current_profile(), "checkout");
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let modes = controller(dir.path());
        for bad in ["", "   ", "..", "a/b", "a\\b"] {
            assert!(matches!(
                modes.set_recording(bad),
                Err(GatewayError::InvalidProfile(_))
            ));
        }
        assert_eq!(modes.current_mode(), GatewayMode::Forwarding);
    }

    #[test]
    fn test_set_replaying_loads_profile() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("checkout")).unwrap();
        fs::write(
            dir.path().join("checkout/items.json"),
            r#"{"stubs": [{"request": {"pathname": "/items", "method": "GET"}, "response": {"statusCode": 200, "body": "ok"}}]}"#,
        )
        .unwrap();

        let modes = controller(dir.path());
        modes.set_replaying("Checkout").unwrap();

        let snapshot = modes.snapshot();
        assert_eq!(snapshot.mode, GatewayMode::Replaying);
        assert_eq!(snapshot.profile, "checkout");
        assert_eq!(snapshot.matcher.map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_failed_replay_load_keeps_previous_mode() {
        let dir = tempfile::tempdir().unwrap();
        let modes = controller(dir.path());
        modes.set_recording("first").unwrap();

        let result = modes.set_replaying("missing");
        assert!(matches!(result, Err(GatewayError::ProfileLoad { .. })));
        assert_eq!(modes.current_mode(), GatewayMode::Recording);
        assert_eq!(modes.current_profile(), "first");
    }

    #[test]
    fn test_forwarding_clears_profile_and_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("p")).unwrap();
        let modes = controller(dir.path());
        modes.set_replaying("p").unwrap();
        modes.set_forwarding();

        let snapshot = modes.snapshot();
        assert_eq!(snapshot.mode, GatewayMode::Forwarding);
        assert!(snapshot.profile.is_empty());
        assert!(snapshot.matcher.is_none());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(GatewayMode::Replaying.to_string(), "Replaying");
        assert_eq!(
            serde_json::to_string(&GatewayMode::Recording).unwrap(),
            "\"Recording\""
        );
    }
}
