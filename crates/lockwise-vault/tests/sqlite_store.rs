//! The vault over the real SQLite logins engine.

mod common;

use std::sync::Arc;

use common::{T0, sync_credential};
use lockwise_kernel::ManualClock;
use lockwise_store::{CredentialStore, MemoryKeychain, MemorySettings, SqliteLoginStore};
use lockwise_vault::{
    AutoLockCoordinator, NotificationBus, VaultHandle, VaultState, VaultStateMachine,
};

const PROFILE: &str = "test-profile";

fn spawn_vault(store: Arc<SqliteLoginStore>, keychain: Arc<MemoryKeychain>) -> VaultHandle {
    let autolock = AutoLockCoordinator::new(
        Arc::new(MemorySettings::new()),
        Arc::new(ManualClock::new(T0)),
    );
    let machine =
        VaultStateMachine::new(store, keychain, autolock, NotificationBus::new(16), PROFILE);
    let (handle, _task) = machine.spawn(8);
    handle
}

#[tokio::test]
async fn link_lock_unlock_tracks_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteLoginStore::new(dir.path()));
    let vault = spawn_vault(store.clone(), Arc::new(MemoryKeychain::new()));
    vault.restore().await.unwrap();

    vault.update_credentials(sync_credential("kid-1")).await.unwrap();
    assert_eq!(vault.state(), VaultState::Unlocked);
    assert!(!store.is_locked().await);

    vault.lock().await;
    assert!(store.is_locked().await);
    vault.unlock().await.unwrap();
    assert!(!store.is_locked().await);
}

#[tokio::test]
async fn failed_wipe_leaves_vault_and_store_locked() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteLoginStore::new(dir.path()));
    let vault = spawn_vault(store.clone(), Arc::new(MemoryKeychain::new()));
    vault.restore().await.unwrap();
    vault.update_credentials(sync_credential("kid-1")).await.unwrap();
    assert_eq!(vault.state(), VaultState::Unlocked);

    // A directory where the logins file should be cannot be removed.
    let path = SqliteLoginStore::path_for(dir.path(), PROFILE);
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    assert!(vault.reset().await.is_err());
    assert_eq!(vault.state(), VaultState::Locked);
    assert!(store.is_locked().await);
}
