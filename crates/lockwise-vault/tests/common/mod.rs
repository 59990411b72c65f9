//! Shared fakes for the vault integration tests.
//!
//! [`RecordingStore`] and [`RecordingIndex`] log every call so tests can
//! assert on exactly which store operations a transition issued.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lockwise_kernel::{AutoLockSetting, ManualClock};
use lockwise_store::{
    Credential, CredentialStore, KeychainProvider, MemoryKeychain, MemorySettings, NewCredential,
    SettingKey, SettingsStore, StoreError, StoreResult, SyncUnlockInfo,
};
use lockwise_vault::{
    AutoLockCoordinator, CredentialIdentity, IdentityIndex, IdentityIndexStatus, NotificationBus,
    Result as VaultResult, SyncCredential, VaultConfig, VaultContext, VaultError, VaultHandle,
    VaultState, VaultStateMachine,
};

pub const T0: i64 = 1_700_000_000;

// ═══════════════════════════════════════════════════════════════════════
//  Recording store
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Open(String),
    Close,
    EnsureUnlocked,
    EnsureLocked,
    Sync(String),
    WipeLocal,
    List,
    Get(String),
    Touch(String),
    Add,
    Delete(String),
}

#[derive(Default)]
struct StoreInner {
    calls: Vec<StoreCall>,
    open: bool,
    applied_key: Option<String>,
    /// The first key ever applied; later keys must match it.
    accepted_key: Option<String>,
    records: Vec<Credential>,
    fail_wipe: bool,
    fail_sync: bool,
    fail_ensure_locked: bool,
    fail_ensure_unlocked: bool,
}

/// In-memory [`CredentialStore`] that records every call.
#[derive(Default)]
pub struct RecordingStore {
    inner: Mutex<StoreInner>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut StoreInner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn is_locked_now(&self) -> bool {
        self.with(|s| s.applied_key.is_none())
    }

    pub fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    pub fn fail_wipe(&self, fail: bool) {
        self.with(|s| s.fail_wipe = fail);
    }

    pub fn fail_sync(&self, fail: bool) {
        self.with(|s| s.fail_sync = fail);
    }

    pub fn fail_ensure_locked(&self, fail: bool) {
        self.with(|s| s.fail_ensure_locked = fail);
    }

    pub fn fail_ensure_unlocked(&self, fail: bool) {
        self.with(|s| s.fail_ensure_unlocked = fail);
    }

    /// Pretend a different key was used to create the store.
    pub fn corrupt_key(&self) {
        self.with(|s| s.accepted_key = Some("not-the-key".into()));
    }

    pub fn seed(&self, records: Vec<Credential>) {
        self.with(|s| s.records = records);
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn open(&self, profile: &str) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::Open(profile.to_string()));
            s.open = true;
            Ok(())
        })
    }

    async fn close(&self) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::Close);
            s.open = false;
            s.applied_key = None;
            Ok(())
        })
    }

    async fn is_locked(&self) -> bool {
        self.is_locked_now()
    }

    async fn ensure_unlocked(&self, key: &str) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::EnsureUnlocked);
            if !s.open {
                return Err(StoreError::NotOpen);
            }
            if s.fail_ensure_unlocked {
                return Err(StoreError::Locked);
            }
            match &s.accepted_key {
                Some(accepted) if accepted != key => Err(StoreError::InvalidKey {
                    reason: "mismatch".into(),
                }),
                _ => {
                    s.accepted_key = Some(key.to_string());
                    s.applied_key = Some(key.to_string());
                    Ok(())
                }
            }
        })
    }

    async fn ensure_locked(&self) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::EnsureLocked);
            s.applied_key = None;
            if s.fail_ensure_locked {
                return Err(StoreError::Io(std::io::Error::other("disk gone")));
            }
            Ok(())
        })
    }

    async fn sync(&self, info: &SyncUnlockInfo) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::Sync(info.kid.clone()));
            if s.fail_sync {
                return Err(StoreError::SyncFailed {
                    reason: "server unavailable".into(),
                });
            }
            Ok(())
        })
    }

    async fn wipe_local(&self) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::WipeLocal);
            if s.fail_wipe {
                return Err(StoreError::Io(std::io::Error::other("read-only fs")));
            }
            s.open = false;
            s.applied_key = None;
            s.accepted_key = None;
            s.records.clear();
            Ok(())
        })
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        self.with(|s| {
            s.calls.push(StoreCall::List);
            if s.applied_key.is_none() {
                return Err(StoreError::Locked);
            }
            Ok(s.records.clone())
        })
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Credential>> {
        self.with(|s| {
            s.calls.push(StoreCall::Get(id.to_string()));
            Ok(s.records.iter().find(|c| c.id == id).cloned())
        })
    }

    async fn touch(&self, id: &str) -> StoreResult<()> {
        self.with(|s| {
            s.calls.push(StoreCall::Touch(id.to_string()));
            match s.records.iter_mut().find(|c| c.id == id) {
                Some(record) => {
                    record.times_used += 1;
                    Ok(())
                }
                None => Err(StoreError::NotFound {
                    entity: "login",
                    id: id.to_string(),
                }),
            }
        })
    }

    async fn add(&self, credential: NewCredential) -> StoreResult<String> {
        self.with(|s| {
            s.calls.push(StoreCall::Add);
            let id = format!("id-{}", s.records.len() + 1);
            s.records.push(Credential {
                id: id.clone(),
                hostname: credential.hostname,
                username: credential.username,
                password: credential.password,
                last_used: None,
                times_used: 0,
            });
            Ok(id)
        })
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.with(|s| {
            s.calls.push(StoreCall::Delete(id.to_string()));
            let before = s.records.len();
            s.records.retain(|c| c.id != id);
            Ok(s.records.len() != before)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Recording identity index
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    State,
    RemoveAll,
    Save(Vec<CredentialIdentity>),
}

#[derive(Default)]
struct IndexInner {
    calls: Vec<IndexCall>,
    enabled: bool,
    fail_save: bool,
}

pub struct RecordingIndex {
    inner: Mutex<IndexInner>,
}

impl RecordingIndex {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Mutex::new(IndexInner {
                enabled,
                ..IndexInner::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<IndexCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, IndexCall::State))
            .collect()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().unwrap().enabled = enabled;
    }

    pub fn fail_save(&self, fail: bool) {
        self.inner.lock().unwrap().fail_save = fail;
    }
}

#[async_trait]
impl IdentityIndex for RecordingIndex {
    async fn state(&self) -> VaultResult<IdentityIndexStatus> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(IndexCall::State);
        Ok(IdentityIndexStatus {
            enabled: inner.enabled,
            supports_incremental_updates: false,
        })
    }

    async fn remove_all(&self) -> VaultResult<()> {
        self.inner.lock().unwrap().calls.push(IndexCall::RemoveAll);
        Ok(())
    }

    async fn save(&self, identities: Vec<CredentialIdentity>) -> VaultResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(IndexCall::Save(identities));
        if inner.fail_save {
            return Err(VaultError::IdentityIndex {
                reason: "quota exceeded".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Fixture
// ═══════════════════════════════════════════════════════════════════════

/// Fakes for every collaborator, with the clock at [`T0`].
pub struct Fixture {
    pub store: Arc<RecordingStore>,
    pub keychain: Arc<MemoryKeychain>,
    pub settings: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
    pub index: Arc<RecordingIndex>,
    pub notifications: NotificationBus,
}

impl Fixture {
    pub fn new(setting: AutoLockSetting) -> Self {
        let settings = Arc::new(MemorySettings::new());
        settings.set_auto_lock_setting(setting).unwrap();
        Self {
            store: Arc::new(RecordingStore::new()),
            keychain: Arc::new(MemoryKeychain::new()),
            settings,
            clock: Arc::new(ManualClock::new(T0)),
            index: Arc::new(RecordingIndex::new(true)),
            notifications: NotificationBus::new(64),
        }
    }

    pub fn autolock(&self) -> AutoLockCoordinator {
        AutoLockCoordinator::new(self.settings.clone(), self.clock.clone())
    }

    /// The vault task alone, without bus listeners.
    pub fn spawn_vault(&self) -> VaultHandle {
        let machine = VaultStateMachine::new(
            self.store.clone(),
            self.keychain.clone(),
            self.autolock(),
            self.notifications.clone(),
            "test-profile",
        );
        let (handle, _task) = machine.spawn(16);
        handle
    }

    /// A restored vault that has been linked and is `Unlocked`.
    pub async fn linked_vault(&self) -> VaultHandle {
        let vault = self.spawn_vault();
        assert_eq!(vault.restore().await.unwrap(), VaultState::Unprepared);
        vault.update_credentials(sync_credential("kid-1")).await.unwrap();
        assert_eq!(vault.state(), VaultState::Unlocked);
        vault
    }

    /// A full runtime wired from these fakes.
    pub fn context(&self) -> VaultContext {
        VaultContext::new(
            VaultConfig::default().with_profile("test-profile"),
            self.store.clone(),
            self.keychain.clone(),
            self.settings.clone(),
            self.clock.clone(),
            self.index.clone(),
        )
    }

    pub fn deadline(&self) -> Option<i64> {
        self.settings.get_i64(SettingKey::AutoLockTimerDate).unwrap()
    }

    pub fn has_key(&self) -> bool {
        self.keychain.has_database_key().unwrap()
    }
}

pub fn sync_credential(kid: &str) -> SyncCredential {
    SyncCredential {
        sync_info: SyncUnlockInfo {
            kid: kid.into(),
            access_token: "access-token".into(),
            sync_key: "sync-key".into(),
            token_server_url: "https://token.example.com/1.0/sync/1.5".into(),
        },
        is_new: false,
    }
}

pub fn credential(id: &str, host: &str, user: Option<&str>) -> Credential {
    Credential {
        id: id.into(),
        hostname: host.into(),
        username: user.map(Into::into),
        password: format!("pw-{id}"),
        last_used: None,
        times_used: 0,
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
