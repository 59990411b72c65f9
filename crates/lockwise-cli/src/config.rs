//! Configuration loading.
//!
//! Reads the `[vault]` section from `config/default.toml`, then applies
//! `LOCKWISE_*` environment overrides and finally the `--data-dir` flag.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lockwise_vault::VaultConfig;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vault: VaultConfig,
}

/// Parse the `[vault]` section of a TOML document. A missing section yields
/// the defaults.
pub fn parse_vault_config(content: &str) -> Result<VaultConfig> {
    let file: ConfigFile = toml::from_str(content).context("invalid configuration file")?;
    Ok(file.vault)
}

/// Load the file at `path`, falling back to defaults when it does not exist.
pub fn load_vault_config(path: &Path) -> Result<VaultConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "configuration file loaded");
            parse_vault_config(&content)
                .with_context(|| format!("failed to parse {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(VaultConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Apply environment and command-line overrides, in that order.
pub fn apply_overrides(
    mut config: VaultConfig,
    env: impl Fn(&str) -> Option<String>,
    data_dir: Option<PathBuf>,
) -> VaultConfig {
    if let Some(dir) = env("LOCKWISE_DATA_DIR").filter(|v| !v.is_empty()) {
        config = config.with_data_dir(dir);
    }
    if let Some(profile) = env("LOCKWISE_PROFILE").filter(|v| !v.is_empty()) {
        config = config.with_profile(profile);
    }
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    config
}

/// Full resolution used by the binary: `.env`, file, environment, flag.
pub fn resolve(data_dir: Option<PathBuf>) -> Result<VaultConfig> {
    // A missing .env file is the common case.
    let _ = dotenvy::dotenv();
    let config = load_vault_config(Path::new(DEFAULT_CONFIG_PATH))?;
    Ok(apply_overrides(config, |key| std::env::var(key).ok(), data_dir))
}
