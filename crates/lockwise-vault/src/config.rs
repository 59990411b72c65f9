//! Vault configuration.
//!
//! [`VaultConfig`] has sensible defaults via [`Default`], a builder-style
//! API for callers that assemble it in code, and `serde` support for the
//! `[vault]` section of `config/default.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Where the vault keeps its files and how its tasks are sized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the logins, settings and identity-index files.
    ///
    /// Default: **`data`**.
    pub data_dir: PathBuf,

    /// Profile identifier used to name the logins file and keychain item.
    ///
    /// Default: **`lockwise-profile`**.
    pub profile: String,

    /// Pending commands the vault task will queue before callers wait.
    ///
    /// Default: **64**.
    pub command_queue_capacity: usize,

    /// Capacity of the action and notification buses.
    ///
    /// Default: **256**.
    pub bus_capacity: usize,

    /// How often the idle watchdog checks the deadline. `0` turns it off and
    /// leaves locking to the foreground check.
    ///
    /// Default: **0**.
    pub watchdog_interval_secs: u64,

    /// Whether the credential-identity index accepts updates.
    ///
    /// Default: **true**.
    pub identity_index_enabled: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            profile: "lockwise-profile".into(),
            command_queue_capacity: 64,
            bus_capacity: 256,
            watchdog_interval_secs: 0,
            identity_index_enabled: true,
        }
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }

    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    pub fn with_watchdog_interval_secs(mut self, secs: u64) -> Self {
        self.watchdog_interval_secs = secs;
        self
    }

    pub fn with_identity_index_enabled(mut self, enabled: bool) -> Self {
        self.identity_index_enabled = enabled;
        self
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }

    pub fn identity_index_path(&self) -> PathBuf {
        self.data_dir.join("identities.json")
    }

    /// `None` when the watchdog is disabled.
    pub fn watchdog_interval(&self) -> Option<Duration> {
        (self.watchdog_interval_secs > 0).then(|| Duration::from_secs(self.watchdog_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = VaultConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.profile, "lockwise-profile");
        assert_eq!(cfg.command_queue_capacity, 64);
        assert_eq!(cfg.bus_capacity, 256);
        assert!(cfg.watchdog_interval().is_none());
        assert!(cfg.identity_index_enabled);
    }

    #[test]
    fn builder_chain() {
        let cfg = VaultConfig::new()
            .with_data_dir("/tmp/lw")
            .with_profile("alice")
            .with_watchdog_interval_secs(15)
            .with_identity_index_enabled(false);
        assert_eq!(cfg.settings_path(), PathBuf::from("/tmp/lw/settings.db"));
        assert_eq!(cfg.identity_index_path(), PathBuf::from("/tmp/lw/identities.json"));
        assert_eq!(cfg.profile, "alice");
        assert_eq!(cfg.watchdog_interval(), Some(Duration::from_secs(15)));
        assert!(!cfg.identity_index_enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: VaultConfig = toml::from_str(
            r#"
            profile = "bob"
            watchdog_interval_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.profile, "bob");
        assert_eq!(cfg.watchdog_interval_secs, 30);
        assert_eq!(cfg.bus_capacity, 256);
    }
}
