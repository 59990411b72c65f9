//! Explicit wiring of vault collaborators.
//!
//! [`VaultContext`] holds every dependency the vault subsystems need.  Tests
//! build one from fakes; the binary uses [`VaultContext::open_default`].
//! [`VaultContext::start`] spawns the tasks and restores the vault.

use std::sync::Arc;

use lockwise_kernel::{Action, ActionBus, Clock, SystemClock};
use lockwise_store::{
    CredentialStore, Database, KeychainProvider, SETTINGS_MIGRATIONS, SettingsStore,
    SqliteLoginStore, SqliteSettings, platform_keychain,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::autolock::AutoLockCoordinator;
use crate::config::VaultConfig;
use crate::error::Result;
use crate::identity::{FileIdentityIndex, IdentityIndex};
use crate::machine::{VaultHandle, VaultStateMachine};
use crate::provider_sync::CredentialProviderSync;
use crate::state::NotificationBus;

/// Every dependency of a running vault.
pub struct VaultContext {
    pub config: VaultConfig,
    pub store: Arc<dyn CredentialStore>,
    pub keychain: Arc<dyn KeychainProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
    pub identity_index: Arc<dyn IdentityIndex>,
    pub actions: ActionBus,
    pub notifications: NotificationBus,
}

impl VaultContext {
    pub fn new(
        config: VaultConfig,
        store: Arc<dyn CredentialStore>,
        keychain: Arc<dyn KeychainProvider>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        identity_index: Arc<dyn IdentityIndex>,
    ) -> Self {
        let actions = ActionBus::new(config.bus_capacity);
        let notifications = NotificationBus::new(config.bus_capacity);
        Self {
            config,
            store,
            keychain,
            settings,
            clock,
            identity_index,
            actions,
            notifications,
        }
    }

    /// Production collaborators rooted at `config.data_dir`.
    pub async fn open_default(config: VaultConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(lockwise_store::StoreError::from)?;

        let db = Database::open_and_migrate(config.settings_path(), SETTINGS_MIGRATIONS).await?;
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettings::new(db));
        let store: Arc<dyn CredentialStore> = Arc::new(SqliteLoginStore::new(&config.data_dir));
        let keychain = platform_keychain(&config.data_dir, &config.profile);
        let index: Arc<dyn IdentityIndex> = Arc::new(FileIdentityIndex::new(
            config.identity_index_path(),
            config.identity_index_enabled,
        ));

        Ok(Self::new(
            config,
            store,
            keychain,
            settings,
            Arc::new(SystemClock),
            index,
        ))
    }

    /// Spawn the vault task and its listeners, then restore the vault.
    pub async fn start(self) -> Result<VaultRuntime> {
        let autolock = AutoLockCoordinator::new(Arc::clone(&self.settings), Arc::clone(&self.clock));

        let machine = VaultStateMachine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.keychain),
            autolock.clone(),
            self.notifications.clone(),
            self.config.profile.clone(),
        );
        let (vault, actor) = machine.spawn(self.config.command_queue_capacity);

        let provider_sync = Arc::new(CredentialProviderSync::new(
            vault.clone(),
            Arc::clone(&self.identity_index),
            self.notifications.clone(),
        ));

        // Listeners subscribe before restore so they see its notifications.
        let mut tasks = vec![
            actor,
            vault.spawn_action_listener(&self.actions),
            autolock.spawn_listener(&self.actions, vault.clone()),
            provider_sync.spawn_listener(&self.actions),
        ];
        if let Some(period) = self.config.watchdog_interval() {
            tasks.push(AutoLockCoordinator::spawn_watchdog(vault.clone(), period));
        }

        let state = vault.restore().await?;
        info!(state = %state, profile = %self.config.profile, "vault runtime started");

        Ok(VaultRuntime {
            vault,
            autolock,
            provider_sync,
            actions: self.actions,
            notifications: self.notifications,
            settings: self.settings,
            tasks,
        })
    }
}

/// A started vault and its background tasks.
pub struct VaultRuntime {
    pub vault: VaultHandle,
    pub autolock: AutoLockCoordinator,
    pub provider_sync: Arc<CredentialProviderSync>,
    pub actions: ActionBus,
    pub notifications: NotificationBus,
    pub settings: Arc<dyn SettingsStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl VaultRuntime {
    /// Publish an action to every listener.
    pub fn publish(&self, action: impl Into<Action>) -> usize {
        self.actions.publish(action.into())
    }

    /// Stop every background task.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("vault runtime stopped");
    }
}
