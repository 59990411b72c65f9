//! The OS-level credential-identity index.
//!
//! Password autofill surfaces (a browser's or an OS's) look up saved logins
//! by hostname without unlocking the vault.  They only ever see
//! [`CredentialIdentity`] records: id, hostname and username, never the
//! password.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lockwise_store::Credential;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VaultError};

/// What the index stores for one login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialIdentity {
    pub id: String,
    pub hostname: String,
    pub username: Option<String>,
}

impl From<&Credential> for CredentialIdentity {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            hostname: credential.hostname.clone(),
            username: credential.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityIndexStatus {
    /// The user has allowed this app to act as a credential provider.
    pub enabled: bool,
    pub supports_incremental_updates: bool,
}

/// Host-provided identity store.
#[async_trait]
pub trait IdentityIndex: Send + Sync {
    async fn state(&self) -> Result<IdentityIndexStatus>;

    async fn remove_all(&self) -> Result<()>;

    /// Add `identities` to whatever the index already holds.
    async fn save(&self, identities: Vec<CredentialIdentity>) -> Result<()>;
}

fn index_error(reason: impl std::fmt::Display) -> VaultError {
    VaultError::IdentityIndex {
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// File-backed index
// ---------------------------------------------------------------------------

/// Index persisted as a JSON array, readable by an autofill helper.
pub struct FileIdentityIndex {
    path: PathBuf,
    enabled: AtomicBool,
}

impl FileIdentityIndex {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Current file contents; an absent file is an empty index.
    pub async fn identities(&self) -> Result<Vec<CredentialIdentity>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(index_error),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(index_error(e)),
        }
    }

    async fn write(&self, identities: &[CredentialIdentity]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(index_error)?;
        }
        let json = serde_json::to_vec_pretty(identities).map_err(index_error)?;
        tokio::fs::write(&self.path, json).await.map_err(index_error)
    }
}

#[async_trait]
impl IdentityIndex for FileIdentityIndex {
    async fn state(&self) -> Result<IdentityIndexStatus> {
        Ok(IdentityIndexStatus {
            enabled: self.enabled.load(Ordering::SeqCst),
            supports_incremental_updates: false,
        })
    }

    async fn remove_all(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "identity index cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(index_error(e)),
        }
    }

    async fn save(&self, identities: Vec<CredentialIdentity>) -> Result<()> {
        let mut all = self.identities().await?;
        all.extend(identities);
        self.write(&all).await?;
        debug!(count = all.len(), "identity index saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory index
// ---------------------------------------------------------------------------

pub struct MemoryIdentityIndex {
    enabled: AtomicBool,
    identities: Mutex<Vec<CredentialIdentity>>,
}

impl MemoryIdentityIndex {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            identities: Mutex::new(Vec::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn identities(&self) -> Vec<CredentialIdentity> {
        self.identities
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Vec<CredentialIdentity>>> {
        self.identities.lock().map_err(index_error)
    }
}

#[async_trait]
impl IdentityIndex for MemoryIdentityIndex {
    async fn state(&self) -> Result<IdentityIndexStatus> {
        Ok(IdentityIndexStatus {
            enabled: self.enabled.load(Ordering::SeqCst),
            supports_incremental_updates: true,
        })
    }

    async fn remove_all(&self) -> Result<()> {
        self.guard()?.clear();
        Ok(())
    }

    async fn save(&self, identities: Vec<CredentialIdentity>) -> Result<()> {
        self.guard()?.extend(identities);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> CredentialIdentity {
        CredentialIdentity {
            id: id.into(),
            hostname: format!("https://{id}.example"),
            username: Some(format!("user-{id}")),
        }
    }

    #[tokio::test]
    async fn file_index_appends_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileIdentityIndex::new(dir.path().join("ids.json"), true);

        assert!(index.identities().await.unwrap().is_empty());
        index.save(vec![identity("a")]).await.unwrap();
        index.save(vec![identity("b")]).await.unwrap();
        assert_eq!(index.identities().await.unwrap().len(), 2);

        index.remove_all().await.unwrap();
        index.remove_all().await.unwrap();
        assert!(index.identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_index_never_contains_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");
        let index = FileIdentityIndex::new(&path, true);

        let credential = Credential {
            id: "1".into(),
            hostname: "https://bank.example".into(),
            username: Some("me".into()),
            password: "do-not-leak".into(),
            last_used: None,
            times_used: 0,
        };
        index
            .save(vec![CredentialIdentity::from(&credential)])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("bank.example"));
        assert!(!raw.contains("do-not-leak"));
    }

    #[tokio::test]
    async fn enabled_flag_is_reported() {
        let index = MemoryIdentityIndex::new(false);
        assert!(!index.state().await.unwrap().enabled);
        index.set_enabled(true);
        assert!(index.state().await.unwrap().enabled);
    }
}
