//! # lockwise-store
//!
//! Storage layer for Lockwise.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  CredentialStore (trait)                     │
//! │    └─ SqliteLoginStore  <profile>.logins.db  │
//! │  SettingsStore (trait)                       │
//! │    ├─ SqliteSettings    settings.db          │
//! │    └─ MemorySettings                         │
//! │  KeychainProvider (trait)                    │
//! │    ├─ FileKeychain / MacOSKeychain           │
//! │    └─ MemoryKeychain                         │
//! ├──────────────────────────────────────────────┤
//! │  crypto (ring AES-256-GCM, PBKDF2)           │
//! │  Database (rusqlite WAL) + Migrations        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! use lockwise_store::{Database, SqliteSettings, SETTINGS_MIGRATIONS};
//!
//! let db = Database::open_and_migrate("data/settings.db", SETTINGS_MIGRATIONS).await?;
//! let settings = SqliteSettings::new(db);
//! ```

pub mod credential;
pub mod crypto;
pub mod db;
pub mod error;
pub mod keychain;
pub mod logins;
pub mod migration;
pub mod settings;

// ── re-exports ───────────────────────────────────────────────────────

pub use credential::{Credential, CredentialStore, NewCredential, SyncUnlockInfo};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use keychain::{FileKeychain, KeychainProvider, MemoryKeychain, platform_keychain};
pub use logins::SqliteLoginStore;
pub use migration::{LOGINS_MIGRATIONS, Migration, SETTINGS_MIGRATIONS};
pub use settings::{MemorySettings, SettingKey, SettingsStore, SqliteSettings};
