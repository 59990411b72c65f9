//! The vault state machine.
//!
//! A single task owns the [`CredentialStore`] handle and the current
//! [`VaultState`].  Every request reaches it through an `mpsc` command queue,
//! so lock, unlock, reset and lifecycle transitions are applied one at a
//! time, in arrival order, and never interleave.  Callers hold a cheap
//! [`VaultHandle`].
//!
//! ```text
//!              update_credentials
//!   Unprepared ───────────────────▶ Unlocked ◀──┐
//!        ▲                           │    ▲     │ unlock
//!        │ reset                lock │    │     │
//!        │                           ▼    │     │
//!        └──────────────────────── Locked ──────┘
//! ```
//!
//! Invariant: whenever the state is `Unlocked` the store has the key
//! applied, and whenever it is not the store has none.

use std::sync::Arc;

use lockwise_kernel::{Action, ActionBus, DataStoreAction, KernelError, LifecycleEvent};
use lockwise_store::crypto;
use lockwise_store::{
    Credential, CredentialStore, KeychainProvider, NewCredential, StoreError,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::autolock::AutoLockCoordinator;
use crate::error::{Result, VaultError};
use crate::state::{Notification, NotificationBus, SyncCredential, SyncState, VaultState};

type Reply<T> = oneshot::Sender<T>;

/// Requests accepted by the vault task.
enum Command {
    Restore(Reply<Result<VaultState>>),
    UpdateCredentials(SyncCredential, Reply<Result<()>>),
    Lock(Reply<()>),
    Unlock(Reply<Result<()>>),
    Reset(Reply<Result<()>>),
    Lifecycle(LifecycleEvent, Reply<()>),
    Sync(Reply<Result<()>>),
    Activity(Reply<()>),
    LockIfIdle(Reply<()>),
    List(Reply<Result<Vec<Credential>>>),
    Get(String, Reply<Result<Option<Credential>>>),
    Touch(String, Reply<Result<()>>),
    Add(NewCredential, Reply<Result<String>>),
    Delete(String, Reply<Result<bool>>),
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Owner of the vault state. Consumed by [`VaultStateMachine::spawn`].
pub struct VaultStateMachine {
    store: Arc<dyn CredentialStore>,
    keychain: Arc<dyn KeychainProvider>,
    autolock: AutoLockCoordinator,
    notifications: NotificationBus,
    profile: String,
    state: VaultState,
    sync_state: SyncState,
    credential: Option<SyncCredential>,
    state_tx: watch::Sender<VaultState>,
    sync_tx: watch::Sender<SyncState>,
}

impl VaultStateMachine {
    /// Build a machine in the `Unprepared` state. Nothing touches the store
    /// until [`VaultHandle::restore`] runs on the spawned task.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        keychain: Arc<dyn KeychainProvider>,
        autolock: AutoLockCoordinator,
        notifications: NotificationBus,
        profile: impl Into<String>,
    ) -> Self {
        let (state_tx, _) = watch::channel(VaultState::Unprepared);
        let (sync_tx, _) = watch::channel(SyncState::NotSyncable);
        Self {
            store,
            keychain,
            autolock,
            notifications,
            profile: profile.into(),
            state: VaultState::Unprepared,
            sync_state: SyncState::NotSyncable,
            credential: None,
            state_tx,
            sync_tx,
        }
    }

    /// Start the vault task. It runs until every [`VaultHandle`] is dropped.
    pub fn spawn(self, queue_capacity: usize) -> (VaultHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(queue_capacity.max(1));
        let handle = VaultHandle {
            tx,
            state: self.state_tx.subscribe(),
            sync: self.sync_tx.subscribe(),
            notifications: self.notifications.clone(),
        };

        let mut machine = self;
        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                machine.dispatch(command).await;
            }
            debug!("vault task stopped");
        });

        (handle, task)
    }

    async fn dispatch(&mut self, command: Command) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::Restore(reply) => {
                let _ = reply.send(self.restore().await);
            }
            Command::UpdateCredentials(credential, reply) => {
                let _ = reply.send(self.update_credentials(credential).await);
            }
            Command::Lock(reply) => {
                self.lock().await;
                let _ = reply.send(());
            }
            Command::Unlock(reply) => {
                let _ = reply.send(self.unlock().await);
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.reset().await);
            }
            Command::Lifecycle(event, reply) => {
                self.on_lifecycle(event).await;
                let _ = reply.send(());
            }
            Command::Sync(reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.run_sync().await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Activity(reply) => {
                if self.state == VaultState::Unlocked {
                    debug!("user activity, restarting idle countdown");
                    self.autolock.store_next_autolock_time();
                }
                let _ = reply.send(());
            }
            Command::LockIfIdle(reply) => {
                if self.state == VaultState::Unlocked && self.autolock.lock_currently_required() {
                    info!("idle deadline passed, locking");
                    self.lock().await;
                }
                let _ = reply.send(());
            }
            Command::List(reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.store.list().await.map_err(VaultError::from),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Get(id, reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.store.get(&id).await.map_err(VaultError::from),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Touch(id, reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.store.touch(&id).await.map_err(VaultError::from),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Add(credential, reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.store.add(credential).await.map_err(VaultError::from),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Delete(id, reply) => {
                let result = match self.require_unlocked() {
                    Ok(()) => self.store.delete(&id).await.map_err(VaultError::from),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
        }
    }

    // -- Transitions --------------------------------------------------------

    /// Decide the startup state from the keychain and the persisted deadline.
    async fn restore(&mut self) -> Result<VaultState> {
        self.store.open(&self.profile).await?;

        if !self.keychain.has_database_key()? {
            self.set_sync_state(SyncState::NotSyncable);
            self.transition(VaultState::Unprepared);
            return Ok(self.state);
        }

        self.set_sync_state(SyncState::ReadyToSync);
        self.transition(VaultState::Locked);

        if self.autolock.resume_allowed() {
            match self.apply_key().await {
                Ok(()) => self.transition(VaultState::Unlocked),
                Err(e) => {
                    warn!(error = %e, "could not resume unlocked session");
                    self.lock().await;
                }
            }
        } else {
            self.lock().await;
        }

        info!(state = %self.state, "vault restored");
        Ok(self.state)
    }

    async fn update_credentials(&mut self, credential: SyncCredential) -> Result<()> {
        if self.state != VaultState::Unprepared && self.credential.as_ref() == Some(&credential) {
            debug!("identical sync credential, nothing to do");
            return Ok(());
        }

        if self.state != VaultState::Unprepared {
            self.credential = Some(credential);
            // Logged and reflected in the sync state; the link itself
            // succeeded and the lock state is left as it is.
            let _ = self.run_sync().await;
            return Ok(());
        }

        self.prepare().await?;
        self.credential = Some(credential);
        self.set_sync_state(SyncState::ReadyToSync);
        self.transition(VaultState::Unlocked);
        let _ = self.run_sync().await;
        Ok(())
    }

    /// Create key material for a freshly linked account and apply it.
    ///
    /// On failure the key is removed again, so an unsuccessful link leaves
    /// nothing behind for the next `restore` to find.
    async fn prepare(&mut self) -> Result<()> {
        let key = crypto::generate_database_key()?;
        self.keychain.set_database_key(&key)?;

        if let Err(e) = self.apply_new_key(&key).await {
            warn!(error = %e, "link failed, discarding new key");
            if let Err(e) = self.store.ensure_locked().await {
                warn!(error = %e, "store failed to lock after failed link");
            }
            if let Err(e) = self.keychain.delete_database_key() {
                error!(error = %e, "failed to delete key after failed link");
            }
            return Err(e);
        }

        self.autolock.forward_date_next_lock_time();
        info!("vault prepared for linked account");
        Ok(())
    }

    async fn apply_new_key(&self, key: &str) -> Result<()> {
        self.store.open(&self.profile).await?;

        match self.store.ensure_unlocked(key).await {
            Ok(()) => Ok(()),
            Err(StoreError::InvalidKey { .. }) => {
                // Files left behind by a profile whose key is gone cannot be
                // read by anyone; start over.
                warn!("discarding unreadable logins from a previous link");
                self.store.wipe_local().await?;
                self.store.open(&self.profile).await?;
                self.store
                    .ensure_unlocked(key)
                    .await
                    .map_err(|e| unlock_error(&e))
            }
            Err(e) => Err(unlock_error(&e)),
        }
    }

    /// Infallible: store failures are logged and the vault still locks.
    async fn lock(&mut self) {
        if self.state == VaultState::Unprepared {
            debug!("lock requested while unprepared, ignoring");
            return;
        }
        if let Err(e) = self.store.ensure_locked().await {
            error!(error = %e, "store failed to lock");
        }
        self.autolock.backdate_next_lock_time();
        self.transition(VaultState::Locked);
    }

    async fn unlock(&mut self) -> Result<()> {
        match self.state {
            VaultState::Unprepared => return Err(VaultError::Unprepared),
            VaultState::Unlocked => {
                debug!("already unlocked");
                return Ok(());
            }
            VaultState::Locked => {}
        }

        self.store.open(&self.profile).await?;
        self.apply_key().await?;
        self.autolock.forward_date_next_lock_time();
        self.transition(VaultState::Unlocked);

        if self.credential.is_some() {
            let _ = self.run_sync().await;
        }
        Ok(())
    }

    /// Fails only if the wipe fails. The store may have dropped its key by
    /// then, so a prepared vault is locked before the error is returned.
    async fn reset(&mut self) -> Result<()> {
        if let Err(e) = self.store.wipe_local().await {
            error!(error = %e, "wipe failed");
            self.lock().await;
            return Err(e.into());
        }

        if let Err(e) = self.keychain.delete_database_key() {
            warn!(error = %e, "failed to delete database key after wipe");
        }
        self.credential = None;
        self.set_sync_state(SyncState::NotSyncable);
        self.transition(VaultState::Unprepared);
        info!("vault reset");
        Ok(())
    }

    async fn on_lifecycle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Background | LifecycleEvent::Shutdown => {
                if self.state == VaultState::Unlocked {
                    self.autolock.store_next_autolock_time();
                    if self.autolock.lock_currently_required() {
                        self.lock().await;
                    }
                }
                if let Err(e) = self.store.close().await {
                    warn!(error = %e, "failed to close store");
                }
            }
            LifecycleEvent::Foreground => {
                if let Err(e) = self.store.open(&self.profile).await {
                    error!(error = %e, "failed to reopen store");
                    if self.state == VaultState::Unlocked {
                        self.lock().await;
                    }
                    return;
                }

                if self.state != VaultState::Unlocked {
                    return;
                }
                if self.autolock.lock_currently_required() {
                    info!("idle deadline passed while in background");
                    self.lock().await;
                } else if let Err(e) = self.apply_key().await {
                    warn!(error = %e, "could not re-key reopened store");
                    self.lock().await;
                } else {
                    debug!("resumed unlocked");
                }
            }
        }
    }

    // -- Helpers ------------------------------------------------------------

    /// Fetch the key from the keychain and apply it to the open store.
    async fn apply_key(&self) -> Result<()> {
        let key = self
            .keychain
            .get_database_key()
            .map_err(|e| unlock_error(&e))?;
        self.store
            .ensure_unlocked(&key)
            .await
            .map_err(|e| unlock_error(&e))
    }

    async fn run_sync(&mut self) -> Result<()> {
        let Some(credential) = self.credential.clone() else {
            return Err(VaultError::Sync {
                reason: "no linked account".into(),
            });
        };

        self.set_sync_state(SyncState::Syncing);
        match self.store.sync(&credential.sync_info).await {
            Ok(()) => {
                self.set_sync_state(SyncState::Synced);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sync failed");
                self.set_sync_state(SyncState::Error(e.to_string()));
                Err(VaultError::Sync {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn require_unlocked(&self) -> Result<()> {
        match self.state {
            VaultState::Unlocked => Ok(()),
            VaultState::Locked => Err(VaultError::Locked),
            VaultState::Unprepared => Err(VaultError::Unprepared),
        }
    }

    fn transition(&mut self, next: VaultState) {
        if self.state == next {
            return;
        }
        info!(from = %self.state, to = %next, "vault state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        self.notifications.publish(Notification::Vault(next));
    }

    fn set_sync_state(&mut self, next: SyncState) {
        if self.sync_state == next {
            return;
        }
        self.sync_state = next.clone();
        self.sync_tx.send_replace(next.clone());
        self.notifications.publish(Notification::Sync(next));
    }
}

fn unlock_error(e: &StoreError) -> VaultError {
    VaultError::Unlock {
        reason: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front door to the vault task.
#[derive(Clone)]
pub struct VaultHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<VaultState>,
    sync: watch::Receiver<SyncState>,
    notifications: NotificationBus,
}

impl VaultHandle {
    /// Last committed state.
    pub fn state(&self) -> VaultState {
        *self.state.borrow()
    }

    /// Last published sync state.
    pub fn sync_state(&self) -> SyncState {
        self.sync.borrow().clone()
    }

    /// Subscribe to future notifications.
    pub fn subscribe(&self) -> lockwise_kernel::BusReceiver<Notification> {
        self.notifications.subscribe()
    }

    /// True once the vault task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Decide the startup state. Called once by the runtime.
    pub async fn restore(&self) -> Result<VaultState> {
        self.request(Command::Restore).await?
    }

    /// Hand over fresh account-link material.
    pub async fn update_credentials(&self, credential: SyncCredential) -> Result<()> {
        self.request(|reply| Command::UpdateCredentials(credential, reply))
            .await?
    }

    /// Lock the vault. Never fails; problems are logged.
    pub async fn lock(&self) {
        if self.request(Command::Lock).await.is_err() {
            warn!("lock requested after vault shut down");
        }
    }

    /// Apply the keychain key to the store. Fails with
    /// [`VaultError::Unprepared`] when no account is linked.
    pub async fn unlock(&self) -> Result<()> {
        self.request(Command::Unlock).await?
    }

    /// Wipe local data and forget the key.
    pub async fn reset(&self) -> Result<()> {
        self.request(Command::Reset).await?
    }

    /// Background, foreground or shutdown. Never fails; problems are logged.
    pub async fn on_lifecycle(&self, event: LifecycleEvent) {
        if self.request(|reply| Command::Lifecycle(event, reply)).await.is_err() {
            warn!(?event, "lifecycle event after vault shut down");
        }
    }

    /// Sync the linked account. Requires an unlocked vault.
    pub async fn sync(&self) -> Result<()> {
        self.request(Command::Sync).await?
    }

    /// Record user activity: restarts the idle countdown if unlocked.
    ///
    /// Runs on the vault task, so it is ordered against lock and unlock.
    pub async fn record_activity(&self) {
        if self.request(Command::Activity).await.is_err() {
            warn!("activity recorded after vault shut down");
        }
    }

    /// Lock if unlocked and the idle deadline has passed.
    pub async fn lock_if_idle(&self) {
        if self.request(Command::LockIfIdle).await.is_err() {
            warn!("idle check after vault shut down");
        }
    }

    /// Every stored login. Requires an unlocked vault.
    pub async fn list(&self) -> Result<Vec<Credential>> {
        self.request(Command::List).await?
    }

    /// One login by id. Requires an unlocked vault.
    pub async fn get(&self, id: impl Into<String>) -> Result<Option<Credential>> {
        let id = id.into();
        self.request(|reply| Command::Get(id, reply)).await?
    }

    /// Count one use of a login.
    pub async fn touch(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::Touch(id, reply)).await?
    }

    /// Store a new login and return its id.
    pub async fn add(&self, credential: NewCredential) -> Result<String> {
        self.request(|reply| Command::Add(credential, reply)).await?
    }

    /// Remove a login. `false` if no login had that id.
    pub async fn delete(&self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        self.request(|reply| Command::Delete(id, reply)).await?
    }

    /// Apply one bus action. Actions for other subsystems are ignored.
    pub async fn handle_action(&self, action: &Action) {
        match action {
            Action::Lifecycle(event) => self.on_lifecycle(*event).await,
            Action::DataStore(DataStoreAction::Lock) => self.lock().await,
            Action::DataStore(DataStoreAction::Unlock) => {
                if let Err(e) = self.unlock().await {
                    warn!(error = %e, "unlock action failed");
                }
            }
            Action::DataStore(DataStoreAction::Reset) => {
                if let Err(e) = self.reset().await {
                    error!(error = %e, "reset action failed");
                }
            }
            Action::DataStore(DataStoreAction::Sync) => {
                if let Err(e) = self.sync().await {
                    warn!(error = %e, "sync action failed");
                }
            }
            Action::DataStore(DataStoreAction::Touch { id }) => {
                if let Err(e) = self.touch(id.clone()).await {
                    warn!(error = %e, id = %id, "touch action failed");
                }
            }
            _ => {}
        }
    }

    /// Follow the action bus until it closes.
    pub fn spawn_action_listener(&self, bus: &ActionBus) -> JoinHandle<()> {
        let vault = self.clone();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(action) => vault.handle_action(&action).await,
                    Err(KernelError::Lagged { missed }) => {
                        warn!(missed, "vault action listener lagged");
                    }
                    Err(_) => break,
                }
                if vault.is_closed() {
                    break;
                }
            }
            debug!("vault action listener stopped");
        })
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| VaultError::Shutdown)?;
        rx.await.map_err(|_| VaultError::Shutdown)
    }
}
