//! Lockwise vault.
//!
//! Decides whether decrypted credentials are reachable and keeps every
//! consumer's view of that decision consistent.
//!
//! - **[`machine`]** -- [`VaultStateMachine`]: the `Unprepared` / `Locked` /
//!   `Unlocked` actor that alone drives the [`CredentialStore`] key.
//! - **[`autolock`]** -- [`AutoLockCoordinator`]: the persisted idle
//!   deadline and the activity events that push it back.
//! - **[`provider_sync`]** -- [`CredentialProviderSync`]: mirrors unlocked
//!   credentials into the OS identity index.
//! - **[`identity`]** -- the [`IdentityIndex`] seam and its file and memory
//!   backends.
//! - **[`context`]** -- [`VaultContext`] wiring and the [`VaultRuntime`] it
//!   starts.
//!
//! [`CredentialStore`]: lockwise_store::CredentialStore

pub mod autolock;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod machine;
pub mod provider_sync;
pub mod state;

pub use autolock::{AutoLockCoordinator, EXPIRED_LOCK_INSTANT, NEVER_LOCK_INSTANT};
pub use config::VaultConfig;
pub use context::{VaultContext, VaultRuntime};
pub use error::{Result, VaultError};
pub use identity::{
    CredentialIdentity, FileIdentityIndex, IdentityIndex, IdentityIndexStatus,
    MemoryIdentityIndex,
};
pub use machine::{VaultHandle, VaultStateMachine};
pub use provider_sync::CredentialProviderSync;
pub use state::{
    CredentialIdentityIndexState, Notification, NotificationBus, SyncCredential, SyncState,
    VaultState,
};
