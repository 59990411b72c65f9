//! Idle-deadline bookkeeping.
//!
//! The deadline is an absolute instant persisted in the shared settings
//! store, so it survives restarts and is visible to other processes.  The
//! vault consults it on foreground; nothing here fires a timer except the
//! optional watchdog.
//!
//! | event                         | instant written              |
//! |-------------------------------|------------------------------|
//! | activity / background         | `now + setting` or `NEVER`   |
//! | explicit lock                 | `EXPIRED` (0)                |
//! | explicit unlock               | `NEVER` (`i64::MAX`)         |

use std::sync::Arc;
use std::time::Duration;

use lockwise_kernel::{
    Action, ActionBus, AutoLockSetting, Clock, KernelError, RouteAction, SettingChangedEvent,
    UserInteractionEvent,
};
use lockwise_store::{SettingKey, SettingsStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::machine::VaultHandle;

/// Deadline that never arrives.
pub const NEVER_LOCK_INSTANT: i64 = i64::MAX;

/// Deadline that has always passed.
pub const EXPIRED_LOCK_INSTANT: i64 = 0;

/// Computes, persists and evaluates the next auto-lock instant.
#[derive(Clone)]
pub struct AutoLockCoordinator {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl AutoLockCoordinator {
    /// A coordinator over the shared settings store.
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    /// The configured duration; read failures fall back to the default.
    pub fn setting(&self) -> AutoLockSetting {
        self.settings.auto_lock_setting().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read auto-lock setting, using default");
            AutoLockSetting::default()
        })
    }

    /// Restart the idle countdown from now.
    pub fn store_next_autolock_time(&self) {
        let instant = match self.setting().seconds() {
            Some(secs) => self.clock.now_secs().saturating_add(secs),
            None => NEVER_LOCK_INSTANT,
        };
        self.write(instant);
    }

    /// Mark the deadline as already passed.
    pub fn backdate_next_lock_time(&self) {
        self.write(EXPIRED_LOCK_INSTANT);
    }

    /// Push the deadline out of reach until the next background.
    pub fn forward_date_next_lock_time(&self) {
        self.write(NEVER_LOCK_INSTANT);
    }

    /// The persisted instant. Missing or unreadable counts as expired.
    pub fn next_lock_instant(&self) -> i64 {
        match self.settings.get_i64(SettingKey::AutoLockTimerDate) {
            Ok(Some(instant)) => instant,
            Ok(None) => EXPIRED_LOCK_INSTANT,
            Err(e) => {
                warn!(error = %e, "failed to read auto-lock deadline, treating as expired");
                EXPIRED_LOCK_INSTANT
            }
        }
    }

    /// True once the persisted deadline has been reached.
    pub fn lock_currently_required(&self) -> bool {
        self.next_lock_instant() <= self.clock.now_secs()
    }

    /// Whether a restarted process may come back up unlocked.
    ///
    /// A forward-dated deadline only means "unlocked and not yet
    /// backgrounded"; a process that died in that window must lock unless
    /// the setting itself is `Never`.
    pub fn resume_allowed(&self) -> bool {
        if self.setting() == AutoLockSetting::Never {
            return true;
        }
        let instant = self.next_lock_instant();
        instant != NEVER_LOCK_INSTANT && instant > self.clock.now_secs()
    }

    /// Whether `action` counts as user activity.
    pub fn resets_idle_timer(action: &Action) -> bool {
        match action {
            Action::Interaction(UserInteractionEvent::Route(route)) => {
                !matches!(route, RouteAction::Login(_))
            }
            Action::Interaction(
                UserInteractionEvent::Copy { .. }
                | UserInteractionEvent::RevealPassword { .. }
                | UserInteractionEvent::ExternalLink { .. },
            ) => true,
            Action::Setting(
                SettingChangedEvent::AutoLockTime(_) | SettingChangedEvent::PreferredBrowser(_),
            ) => true,
            _ => false,
        }
    }

    /// Persist any setting carried by `action` and report whether it counts
    /// as user activity.
    ///
    /// The deadline itself is not touched here: the caller hands activity to
    /// the vault task so the write is ordered against lock and unlock.
    pub fn handle(&self, action: &Action) -> bool {
        if let Action::Setting(event) = action {
            if let Err(e) = self.settings.apply(event) {
                warn!(error = %e, ?event, "failed to persist setting change");
            }
        }
        Self::resets_idle_timer(action)
    }

    /// Follow the action bus until it closes.
    ///
    /// Lifecycle events are left to the vault, which writes the deadline
    /// inside its own serialized transition.
    pub fn spawn_listener(&self, bus: &ActionBus, vault: VaultHandle) -> JoinHandle<()> {
        let coordinator = self.clone();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(action) => {
                        // Settings are persisted before the vault restarts the
                        // countdown, so a new duration is the one used.
                        if coordinator.handle(&action) {
                            vault.record_activity().await;
                        }
                    }
                    Err(KernelError::Lagged { missed }) => {
                        warn!(missed, "auto-lock listener lagged");
                    }
                    Err(_) => break,
                }
            }
            debug!("auto-lock listener stopped");
        })
    }

    /// Ask the vault every `period` to lock if its deadline has passed.
    pub fn spawn_watchdog(vault: VaultHandle, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if vault.is_closed() {
                    break;
                }
                vault.lock_if_idle().await;
            }
            debug!("auto-lock watchdog stopped");
        })
    }

    fn write(&self, instant: i64) {
        if let Err(e) = self.settings.set_i64(SettingKey::AutoLockTimerDate, instant) {
            warn!(error = %e, instant, "failed to persist auto-lock deadline");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lockwise_kernel::{
        AccountAction, CopyField, DataStoreAction, LifecycleEvent, LoginRoute, MainRoute,
        ManualClock, SettingRoute,
    };
    use lockwise_store::MemorySettings;

    const T0: i64 = 1_700_000_000;

    fn coordinator(setting: AutoLockSetting) -> (AutoLockCoordinator, Arc<ManualClock>) {
        let settings = Arc::new(MemorySettings::new());
        settings.set_auto_lock_setting(setting).unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        (AutoLockCoordinator::new(settings, clock.clone()), clock)
    }

    #[test]
    fn five_minute_window_boundaries() {
        let (c, clock) = coordinator(AutoLockSetting::FiveMinutes);
        c.store_next_autolock_time();
        assert_eq!(c.next_lock_instant(), T0 + 300);

        clock.set(T0 + 299);
        assert!(!c.lock_currently_required());
        clock.set(T0 + 300);
        assert!(c.lock_currently_required());
        clock.set(T0 + 301);
        assert!(c.lock_currently_required());
    }

    #[test]
    fn never_setting_never_requires_lock() {
        let (c, clock) = coordinator(AutoLockSetting::Never);
        c.store_next_autolock_time();
        assert_eq!(c.next_lock_instant(), NEVER_LOCK_INSTANT);

        clock.advance(10 * 365 * 86_400);
        assert!(!c.lock_currently_required());
        clock.set(i64::MAX - 1);
        assert!(!c.lock_currently_required());
    }

    #[test]
    fn missing_deadline_requires_lock() {
        let (c, _clock) = coordinator(AutoLockSetting::OneHour);
        assert_eq!(c.next_lock_instant(), EXPIRED_LOCK_INSTANT);
        assert!(c.lock_currently_required());
    }

    #[test]
    fn backdate_and_forward_date_write_sentinels() {
        let (c, _clock) = coordinator(AutoLockSetting::OneHour);
        c.backdate_next_lock_time();
        assert_eq!(c.next_lock_instant(), EXPIRED_LOCK_INSTANT);
        assert!(c.lock_currently_required());

        c.forward_date_next_lock_time();
        assert_eq!(c.next_lock_instant(), NEVER_LOCK_INSTANT);
        assert!(!c.lock_currently_required());
    }

    #[test]
    fn on_app_exit_expires_immediately() {
        let (c, _clock) = coordinator(AutoLockSetting::OnAppExit);
        c.store_next_autolock_time();
        assert!(c.lock_currently_required());
    }

    #[test]
    fn resume_rules() {
        let (c, clock) = coordinator(AutoLockSetting::FiveMinutes);

        c.store_next_autolock_time();
        assert!(c.resume_allowed());
        clock.advance(301);
        assert!(!c.resume_allowed());

        // Left unlocked without a background write.
        c.forward_date_next_lock_time();
        assert!(!c.resume_allowed());

        let (never, _) = coordinator(AutoLockSetting::Never);
        never.backdate_next_lock_time();
        assert!(never.resume_allowed());
    }

    #[test]
    fn activity_classification() {
        let resets = [
            Action::Interaction(UserInteractionEvent::Route(RouteAction::Main(MainRoute::ItemList))),
            Action::Interaction(UserInteractionEvent::Route(RouteAction::Setting(
                SettingRoute::AutoLock,
            ))),
            Action::Interaction(UserInteractionEvent::Copy {
                item_id: "x".into(),
                field: CopyField::Password,
            }),
            Action::Interaction(UserInteractionEvent::RevealPassword { visible: true }),
            Action::Interaction(UserInteractionEvent::ExternalLink {
                url: "https://example.com".into(),
            }),
            Action::Setting(SettingChangedEvent::PreferredBrowser("focus".into())),
            Action::Setting(SettingChangedEvent::AutoLockTime(AutoLockSetting::OneHour)),
        ];
        for action in &resets {
            assert!(AutoLockCoordinator::resets_idle_timer(action), "{action:?}");
        }

        let ignored = [
            Action::Interaction(UserInteractionEvent::Route(RouteAction::Login(
                LoginRoute::Welcome,
            ))),
            Action::DataStore(DataStoreAction::Lock),
            Action::DataStore(DataStoreAction::Unlock),
            Action::Account(AccountAction::Clear),
            Action::Lifecycle(LifecycleEvent::Background),
            Action::Setting(SettingChangedEvent::RecordUsageData(true)),
            Action::Setting(SettingChangedEvent::ItemListSort("alpha".into())),
        ];
        for action in &ignored {
            assert!(!AutoLockCoordinator::resets_idle_timer(action), "{action:?}");
        }
    }

    #[test]
    fn handle_leaves_deadline_to_the_vault() {
        let (c, _clock) = coordinator(AutoLockSetting::FiveMinutes);
        c.backdate_next_lock_time();
        let reveal = Action::Interaction(UserInteractionEvent::RevealPassword { visible: true });

        assert!(c.handle(&reveal));
        assert_eq!(c.next_lock_instant(), EXPIRED_LOCK_INSTANT);
    }

    #[test]
    fn setting_change_is_persisted_before_countdown() {
        let (c, _clock) = coordinator(AutoLockSetting::FiveMinutes);
        let change = Action::Setting(SettingChangedEvent::AutoLockTime(AutoLockSetting::OneHour));

        assert!(c.handle(&change));
        assert_eq!(c.setting(), AutoLockSetting::OneHour);
        c.store_next_autolock_time();
        assert_eq!(c.next_lock_instant(), T0 + 3_600);
    }
}
