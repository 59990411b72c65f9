//! Vault error types.
//!
//! Every public vault API returns [`VaultError`].  Callers can tell a bad
//! key ([`VaultError::Unlock`]) apart from a vault that was never linked
//! ([`VaultError::Unprepared`]) without inspecting strings.

use lockwise_store::StoreError;

/// Unified error type for the Lockwise vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Storage ------------------------------------------------------------
    /// Disk or keychain failure while opening, closing or wiping.
    #[error("storage failure: {0}")]
    StoreIo(#[from] StoreError),

    // -- State machine ------------------------------------------------------
    /// The key was missing or did not decrypt the store. The vault stays
    /// locked.
    #[error("unlock failed: {reason}")]
    Unlock { reason: String },

    /// The operation needs a linked account and there is none.
    #[error("vault is not prepared")]
    Unprepared,

    /// Record access was attempted while the vault is locked.
    #[error("vault is locked")]
    Locked,

    /// The vault task has stopped and no longer accepts commands.
    #[error("vault has shut down")]
    Shutdown,

    // -- Sync ---------------------------------------------------------------
    #[error("sync failed: {reason}")]
    Sync { reason: String },

    // -- Identity index -----------------------------------------------------
    /// The credential-identity index rejected an update. Retryable.
    #[error("identity index update failed: {reason}")]
    IdentityIndex { reason: String },

    // -- Generic ------------------------------------------------------------
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
