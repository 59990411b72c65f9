//! Closed action enums.
//!
//! Everything that happens to the vault from the outside arrives as an
//! [`Action`].  Each subsystem owns one sub-enum; listeners match the
//! variants they handle and ignore the rest with a wildcard arm.

use serde::{Deserialize, Serialize};

use crate::setting::AutoLockSetting;

// ---------------------------------------------------------------------------
// Top-level action
// ---------------------------------------------------------------------------

/// An event published on the action bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Lifecycle(LifecycleEvent),
    Interaction(UserInteractionEvent),
    Setting(SettingChangedEvent),
    DataStore(DataStoreAction),
    Account(AccountAction),
    CredentialProvider(CredentialProviderAction),
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Host application lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Foreground,
    Background,
    Shutdown,
}

// ---------------------------------------------------------------------------
// User interaction
// ---------------------------------------------------------------------------

/// Screens reachable by navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteAction {
    Main(MainRoute),
    Setting(SettingRoute),
    /// Onboarding and account-linking screens. Only reachable while the
    /// vault is not yet usable.
    Login(LoginRoute),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MainRoute {
    ItemList,
    ItemDetail { item_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingRoute {
    List,
    Account,
    AutoLock,
    PreferredBrowser,
    CredentialProvider,
    Faq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginRoute {
    Welcome,
    AccountLink,
    Onboarding,
}

/// Which field of a credential was copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyField {
    Username,
    Password,
}

/// Things the user did on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInteractionEvent {
    Route(RouteAction),
    Copy { item_id: String, field: CopyField },
    RevealPassword { visible: bool },
    ExternalLink { url: String },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A persisted preference changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingChangedEvent {
    AutoLockTime(AutoLockSetting),
    PreferredBrowser(String),
    RecordUsageData(bool),
    ItemListSort(String),
    /// Restore every preference to its default.
    Reset,
}

// ---------------------------------------------------------------------------
// Data store / account / credential provider
// ---------------------------------------------------------------------------

/// Requests aimed at the vault itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataStoreAction {
    Lock,
    Unlock,
    Reset,
    Sync,
    Touch { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountAction {
    /// Forget the linked account.
    Clear,
}

/// Requests aimed at the OS credential-identity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialProviderAction {
    Refresh,
    Clear,
}

impl From<LifecycleEvent> for Action {
    fn from(event: LifecycleEvent) -> Self {
        Action::Lifecycle(event)
    }
}

impl From<UserInteractionEvent> for Action {
    fn from(event: UserInteractionEvent) -> Self {
        Action::Interaction(event)
    }
}

impl From<SettingChangedEvent> for Action {
    fn from(event: SettingChangedEvent) -> Self {
        Action::Setting(event)
    }
}

impl From<DataStoreAction> for Action {
    fn from(action: DataStoreAction) -> Self {
        Action::DataStore(action)
    }
}

impl From<AccountAction> for Action {
    fn from(action: AccountAction) -> Self {
        Action::Account(action)
    }
}

impl From<CredentialProviderAction> for Action {
    fn from(action: CredentialProviderAction) -> Self {
        Action::CredentialProvider(action)
    }
}
