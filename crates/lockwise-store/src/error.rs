//! Error types for the lockwise-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    // -- Persistence --------------------------------------------------------
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    // -- Logins engine ------------------------------------------------------
    /// An operation needed an open handle but `open` was never called, or
    /// the handle was closed.
    #[error("store is not open")]
    NotOpen,

    /// Record access was attempted without a key.
    #[error("store is locked")]
    Locked,

    /// The supplied database key does not decrypt this store.
    #[error("invalid database key: {reason}")]
    InvalidKey { reason: String },

    /// Remote sync could not be performed.
    #[error("sync failed: {reason}")]
    SyncFailed { reason: String },

    // -- Crypto -------------------------------------------------------------
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Keychain -----------------------------------------------------------
    /// No database key has been stored yet.
    #[error("database key not found in keychain")]
    DatabaseKeyNotFound,

    /// The keychain backend is unavailable or refused the operation.
    #[error("keychain unavailable: {reason}")]
    KeychainUnavailable { reason: String },
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
