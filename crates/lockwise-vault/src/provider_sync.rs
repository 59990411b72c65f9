//! Mirrors the unlocked credential list into the identity index.
//!
//! Every refresh replaces the index contents wholesale: remove everything,
//! then save a fresh snapshot.  A refresh that fails part way leaves the
//! tracked state at `Populating`; the next refresh starts over, so retrying
//! is always safe.

use std::sync::Arc;

use lockwise_kernel::{Action, ActionBus, CredentialProviderAction, KernelError};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identity::{CredentialIdentity, IdentityIndex};
use crate::machine::VaultHandle;
use crate::state::{CredentialIdentityIndexState, Notification, NotificationBus, VaultState};

/// Keeps the OS identity index in step with the vault.
///
/// Reads credentials only through the [`VaultHandle`], so a locked vault
/// yields an error rather than stale data.
pub struct CredentialProviderSync {
    vault: VaultHandle,
    index: Arc<dyn IdentityIndex>,
    notifications: NotificationBus,
    state: watch::Sender<CredentialIdentityIndexState>,
    /// Serializes refreshes so snapshots never interleave.
    refresh_lock: Mutex<()>,
}

impl CredentialProviderSync {
    /// Starts in `NotAllowed` until the first refresh reads the index state.
    pub fn new(
        vault: VaultHandle,
        index: Arc<dyn IdentityIndex>,
        notifications: NotificationBus,
    ) -> Self {
        let (state, _) = watch::channel(CredentialIdentityIndexState::NotAllowed);
        Self {
            vault,
            index,
            notifications,
            state,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Last tracked index state.
    pub fn state(&self) -> CredentialIdentityIndexState {
        *self.state.borrow()
    }

    /// Replace the index contents with the vault's current credentials.
    ///
    /// Returns `NotAllowed` without touching the vault when the user has
    /// disabled the index. Fails if the vault is not unlocked.
    pub async fn refresh(&self) -> Result<CredentialIdentityIndexState> {
        let _guard = self.refresh_lock.lock().await;

        let status = self.index.state().await?;
        if !status.enabled {
            debug!("identity index disabled by the user");
            self.set_state(CredentialIdentityIndexState::NotAllowed);
            return Ok(CredentialIdentityIndexState::NotAllowed);
        }

        self.set_state(CredentialIdentityIndexState::Populating);

        let identities: Vec<CredentialIdentity> = self
            .vault
            .list()
            .await?
            .iter()
            .map(CredentialIdentity::from)
            .collect();
        let count = identities.len();

        self.index.remove_all().await?;
        self.index.save(identities).await?;

        self.set_state(CredentialIdentityIndexState::Populated);
        info!(count, "identity index populated");
        Ok(CredentialIdentityIndexState::Populated)
    }

    /// Empty the index. The tracked state is left alone.
    pub async fn clear(&self) -> Result<()> {
        self.index.remove_all().await?;
        info!("identity index cleared");
        Ok(())
    }

    /// React to provider actions and to the vault unlocking or resetting.
    pub fn spawn_listener(self: &Arc<Self>, bus: &ActionBus) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut actions = bus.subscribe();
        let mut notifications = self.vault.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    action = actions.recv() => match action {
                        Ok(action) => match action.as_ref() {
                            Action::CredentialProvider(CredentialProviderAction::Refresh) => {
                                this.refresh_logged().await;
                            }
                            Action::CredentialProvider(CredentialProviderAction::Clear) => {
                                this.clear_logged().await;
                            }
                            _ => {}
                        },
                        Err(KernelError::Lagged { missed }) => {
                            warn!(missed, "provider sync lagged on actions");
                        }
                        Err(_) => break,
                    },
                    notification = notifications.recv() => match notification {
                        Ok(notification) => match notification.as_ref() {
                            Notification::Vault(VaultState::Unlocked) => this.refresh_logged().await,
                            Notification::Vault(VaultState::Unprepared) => this.clear_logged().await,
                            _ => {}
                        },
                        Err(KernelError::Lagged { missed }) => {
                            warn!(missed, "provider sync lagged on notifications");
                        }
                        Err(_) => break,
                    },
                }
            }
            debug!("provider sync listener stopped");
        })
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "identity index refresh failed");
        }
    }

    async fn clear_logged(&self) {
        if let Err(e) = self.clear().await {
            warn!(error = %e, "identity index clear failed");
        }
    }

    fn set_state(&self, next: CredentialIdentityIndexState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            self.notifications
                .publish(Notification::IdentityIndex(next));
        }
    }
}
