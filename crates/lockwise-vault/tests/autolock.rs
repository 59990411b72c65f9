//! Auto-lock behaviour of a fully wired runtime driven through the action bus.

mod common;

use std::time::Duration;

use common::{Fixture, T0, eventually, sync_credential};
use lockwise_kernel::{
    Action, AutoLockSetting, CopyField, DataStoreAction, LifecycleEvent, LoginRoute, MainRoute,
    RouteAction, SettingChangedEvent, UserInteractionEvent,
};
use lockwise_store::{SettingKey, SettingsStore};
use lockwise_vault::{EXPIRED_LOCK_INSTANT, NEVER_LOCK_INSTANT, VaultState};

fn copy_password() -> Action {
    UserInteractionEvent::Copy {
        item_id: "id-1".into(),
        field: CopyField::Password,
    }
    .into()
}

#[tokio::test]
async fn activity_pushes_deadline_while_unlocked() {
    let fx = Fixture::new(AutoLockSetting::FiveMinutes);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();
    assert_eq!(fx.deadline(), Some(NEVER_LOCK_INSTANT));

    fx.clock.advance(60);
    runtime.publish(copy_password());
    assert!(eventually(|| fx.deadline() == Some(T0 + 60 + 300)).await);

    runtime.shutdown();
}

#[tokio::test]
async fn activity_while_locked_leaves_deadline() {
    let fx = Fixture::new(AutoLockSetting::FiveMinutes);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();
    runtime.vault.lock().await;

    runtime.publish(copy_password());
    // A later setting event proves the listener has drained the copy.
    runtime.publish(SettingChangedEvent::RecordUsageData(false));
    assert!(
        eventually(|| fx.settings.get(SettingKey::RecordUsageData).unwrap().is_some()).await
    );
    assert_eq!(fx.deadline(), Some(EXPIRED_LOCK_INSTANT));

    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_lock_is_never_undone_by_activity() {
    let fx = Fixture::new(AutoLockSetting::FiveMinutes);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();

    for round in 0..20 {
        let marker = format!("round-{round}");
        runtime.publish(DataStoreAction::Lock);
        runtime.publish(copy_password());
        // Settings are applied in bus order, so the marker lands only after
        // the copy has been handed to the vault.
        runtime.publish(SettingChangedEvent::ItemListSort(marker.clone()));

        assert!(eventually(|| runtime.vault.state() == VaultState::Locked).await);
        assert!(
            eventually(|| fx.settings.get(SettingKey::ItemListSort).unwrap() == Some(marker.clone()))
                .await
        );
        assert_eq!(fx.deadline(), Some(EXPIRED_LOCK_INSTANT), "round {round}");

        runtime.vault.unlock().await.unwrap();
    }

    runtime.shutdown();
}

#[tokio::test]
async fn login_routes_are_not_activity() {
    let fx = Fixture::new(AutoLockSetting::FiveMinutes);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();

    runtime.publish(UserInteractionEvent::Route(RouteAction::Login(
        LoginRoute::Welcome,
    )));
    runtime.publish(SettingChangedEvent::ItemListSort("alpha".into()));
    assert!(eventually(|| fx.settings.get(SettingKey::ItemListSort).unwrap().is_some()).await);
    assert_eq!(fx.deadline(), Some(NEVER_LOCK_INSTANT));

    runtime.publish(UserInteractionEvent::Route(RouteAction::Main(
        MainRoute::ItemList,
    )));
    assert!(eventually(|| fx.deadline() == Some(T0 + 300)).await);

    runtime.shutdown();
}

#[tokio::test]
async fn changing_duration_restarts_countdown_with_new_value() {
    let fx = Fixture::new(AutoLockSetting::FiveMinutes);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();

    runtime.publish(SettingChangedEvent::AutoLockTime(AutoLockSetting::TwelveHours));
    assert!(eventually(|| fx.deadline() == Some(T0 + 12 * 3_600)).await);
    assert_eq!(
        fx.settings.auto_lock_setting().unwrap(),
        AutoLockSetting::TwelveHours
    );

    runtime.shutdown();
}

#[tokio::test]
async fn background_foreground_over_the_bus() {
    let fx = Fixture::new(AutoLockSetting::OneMinute);
    let runtime = fx.context().start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();

    runtime.publish(LifecycleEvent::Background);
    assert!(eventually(|| fx.deadline() == Some(T0 + 60)).await);

    fx.clock.advance(61);
    runtime.publish(LifecycleEvent::Foreground);
    assert!(eventually(|| runtime.vault.state() == VaultState::Locked).await);
    assert!(fx.store.is_locked_now());

    runtime.publish(DataStoreAction::Unlock);
    assert!(eventually(|| runtime.vault.state() == VaultState::Unlocked).await);
    assert_eq!(fx.deadline(), Some(NEVER_LOCK_INSTANT));

    runtime.shutdown();
}

#[tokio::test]
async fn restart_inside_window_resumes_through_runtime() {
    let fx = Fixture::new(AutoLockSetting::FifteenMinutes);
    {
        let runtime = fx.context().start().await.unwrap();
        runtime
            .vault
            .update_credentials(sync_credential("kid-1"))
            .await
            .unwrap();
        runtime.vault.on_lifecycle(LifecycleEvent::Shutdown).await;
        runtime.shutdown();
    }

    fx.clock.advance(14 * 60);
    let runtime = fx.context().start().await.unwrap();
    assert_eq!(runtime.vault.state(), VaultState::Unlocked);
    runtime.shutdown();

    fx.clock.advance(2 * 60);
    let runtime = fx.context().start().await.unwrap();
    assert_eq!(runtime.vault.state(), VaultState::Locked);
    runtime.shutdown();
}

#[tokio::test(start_paused = true)]
async fn watchdog_locks_after_deadline() {
    let fx = Fixture::new(AutoLockSetting::OneMinute);
    let mut context = fx.context();
    context.config = context.config.with_watchdog_interval_secs(5);
    let runtime = context.start().await.unwrap();
    runtime
        .vault
        .update_credentials(sync_credential("kid-1"))
        .await
        .unwrap();

    runtime.publish(copy_password());
    assert!(eventually(|| fx.deadline() == Some(T0 + 60)).await);

    // Still unlocked after a tick inside the window.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(runtime.vault.state(), VaultState::Unlocked);

    fx.clock.advance(61);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(eventually(|| runtime.vault.state() == VaultState::Locked).await);
    assert_eq!(fx.deadline(), Some(EXPIRED_LOCK_INSTANT));

    runtime.shutdown();
}
