//! REPL configuration with change notification.
//!
//! Config lives in a `watch` channel: [`ConfigManager`] is the single
//! writer, and consumers hold a receiver and read the latest value when they
//! need it instead of caching it.
//!
//! # File format
//!
//! ```toml
//! clear_on_submit = true
//! ```
//!
//! The older `clear_on_execute` key is accepted as an alias.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// User-facing REPL settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Cancel a document's pending tasks and clear its results when new
    /// code from that document is submitted.
    #[serde(alias = "clear_on_execute")]
    pub clear_on_submit: bool,
}

impl ReplConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Owns the current [`ReplConfig`] and notifies subscribers on change.
#[derive(Debug)]
pub struct ConfigManager {
    tx: watch::Sender<ReplConfig>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(ReplConfig::default())
    }
}

impl ConfigManager {
    pub fn new(config: ReplConfig) -> Self {
        let (tx, _) = watch::channel(config);
        Self { tx }
    }

    /// Snapshot of the current config.
    pub fn get(&self) -> ReplConfig {
        self.tx.borrow().clone()
    }

    /// Apply `f` to the config. Subscribers are notified only if the value
    /// actually changed.
    pub fn update(&self, f: impl FnOnce(&mut ReplConfig)) {
        self.tx.send_if_modified(|config| {
            let before = config.clone();
            f(config);
            let changed = *config != before;
            if changed {
                debug!(?before, after = ?config, "config changed");
            }
            changed
        });
    }

    /// Replace the whole config (e.g. after reloading the file).
    pub fn replace(&self, config: ReplConfig) {
        self.update(|current| *current = config);
    }

    pub fn set_clear_on_submit(&self, enabled: bool) {
        self.update(|config| config.clear_on_submit = enabled);
    }

    pub fn subscribe(&self) -> watch::Receiver<ReplConfig> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ReplConfig::from_toml_str("").unwrap();
        assert!(!config.clear_on_submit);
    }

    #[test]
    fn test_legacy_key() {
        let config = ReplConfig::from_toml_str("clear_on_execute = true").unwrap();
        assert!(config.clear_on_submit);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ReplConfig::from_toml_str("clear_on_submit = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clear_on_submit = true").unwrap();
        let config = ReplConfig::load(file.path()).unwrap();
        assert!(config.clear_on_submit);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_subscribers_see_changes_only() {
        let manager = ConfigManager::default();
        let mut rx = manager.subscribe();

        manager.set_clear_on_submit(false);
        assert!(!rx.has_changed().unwrap());

        manager.set_clear_on_submit(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().clear_on_submit);
        assert!(manager.get().clear_on_submit);
    }
}
