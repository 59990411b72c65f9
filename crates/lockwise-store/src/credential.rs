//! The credential record and the storage-engine contract.
//!
//! [`CredentialStore`] is everything the vault needs from an encrypted
//! record store.  Open/close manage the file handle and are independent of
//! lock state; `ensure_unlocked`/`ensure_locked` manage the key.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One saved login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque GUID.
    pub id: String,
    pub hostname: String,
    pub username: Option<String>,
    pub password: String,
    pub last_used: Option<DateTime<Utc>>,
    pub times_used: i64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("last_used", &self.last_used)
            .field("times_used", &self.times_used)
            .finish()
    }
}

/// Fields supplied when saving a new login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCredential {
    pub hostname: String,
    pub username: Option<String>,
    pub password: String,
}

impl fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Material needed to sync a profile with the remote service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncUnlockInfo {
    pub kid: String,
    pub access_token: String,
    pub sync_key: String,
    pub token_server_url: String,
}

impl fmt::Debug for SyncUnlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncUnlockInfo")
            .field("kid", &self.kid)
            .field("access_token", &"<redacted>")
            .field("sync_key", &"<redacted>")
            .field("token_server_url", &self.token_server_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Opaque encrypted record storage.
///
/// Implementations must make `open`, `close`, `ensure_locked` and
/// `ensure_unlocked` (with the same key) idempotent.  Record operations fail
/// with [`StoreError::Locked`](crate::StoreError::Locked) while no key is
/// applied.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Open (creating if needed) the store for `profile`.
    async fn open(&self, profile: &str) -> StoreResult<()>;

    /// Release the file handle. Also forgets the applied key.
    async fn close(&self) -> StoreResult<()>;

    async fn is_locked(&self) -> bool;

    /// Apply `key` (as produced by
    /// [`generate_database_key`](crate::crypto::generate_database_key)).
    async fn ensure_unlocked(&self, key: &str) -> StoreResult<()>;

    /// Forget the applied key.
    async fn ensure_locked(&self) -> StoreResult<()>;

    async fn sync(&self, info: &SyncUnlockInfo) -> StoreResult<()>;

    /// Delete every local file for the current profile.
    async fn wipe_local(&self) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<Credential>>;

    async fn get(&self, id: &str) -> StoreResult<Option<Credential>>;

    /// Record a use: bump `last_used` and `times_used`.
    async fn touch(&self, id: &str) -> StoreResult<()>;

    /// Save a new login and return its id.
    async fn add(&self, credential: NewCredential) -> StoreResult<String>;

    /// Delete a login, returning whether it existed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;
}
