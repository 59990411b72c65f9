//! Observable vault state and the notifications that announce it.

use std::fmt;

use lockwise_kernel::Bus;
use lockwise_store::SyncUnlockInfo;
use serde::{Deserialize, Serialize};

/// Whether decrypted credentials are reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VaultState {
    /// No usable key material: never linked, or reset.
    #[default]
    Unprepared,
    Locked,
    Unlocked,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unprepared => "unprepared",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        })
    }
}

/// Progress of the most recent remote sync.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    NotSyncable,
    ReadyToSync,
    Syncing,
    Synced,
    Error(String),
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSyncable => f.write_str("not syncable"),
            Self::ReadyToSync => f.write_str("ready to sync"),
            Self::Syncing => f.write_str("syncing"),
            Self::Synced => f.write_str("synced"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Tracked state of the OS credential-identity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialIdentityIndexState {
    #[default]
    NotAllowed,
    Populating,
    Populated,
}

/// Published after every committed state change, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Vault(VaultState),
    Sync(SyncState),
    IdentityIndex(CredentialIdentityIndexState),
}

pub type NotificationBus = Bus<Notification>;

/// Delivered once per successful account link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCredential {
    pub sync_info: SyncUnlockInfo,
    /// Whether the account was created by this link rather than signed in.
    pub is_new: bool,
}
