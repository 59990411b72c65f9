//! One-shot subcommands. Each runs against an already restored runtime.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use lockwise_kernel::{AutoLockSetting, SettingChangedEvent};
use lockwise_store::{NewCredential, SettingsStore, SyncUnlockInfo};
use lockwise_vault::{
    EXPIRED_LOCK_INSTANT, NEVER_LOCK_INSTANT, SyncCredential, VaultError, VaultRuntime,
};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Human-readable auto-lock deadline.
pub fn describe_deadline(instant: i64) -> String {
    match instant {
        NEVER_LOCK_INSTANT => "never".into(),
        i if i <= EXPIRED_LOCK_INSTANT => "expired".into(),
        i => DateTime::from_timestamp(i, 0)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| i.to_string()),
    }
}

pub fn status(runtime: &VaultRuntime, json: bool) -> Result<()> {
    let state = runtime.vault.state();
    let sync = runtime.vault.sync_state();
    let setting = runtime.autolock.setting();
    let deadline = runtime.autolock.next_lock_instant();

    if json {
        let value = serde_json::json!({
            "state": state,
            "sync_state": sync,
            "auto_lock": setting,
            "deadline": deadline,
            "identity_index": runtime.provider_sync.state(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("  State:          {state}");
    println!("  Sync:           {sync:?}");
    println!("  Auto-lock:      {setting}");
    println!("  Locks at:       {}", describe_deadline(deadline));
    println!("  Identity index: {:?}", runtime.provider_sync.state());
    Ok(())
}

// ---------------------------------------------------------------------------
// Vault control
// ---------------------------------------------------------------------------

pub async fn link(runtime: &VaultRuntime, sync_info: SyncUnlockInfo, is_new: bool) -> Result<()> {
    runtime
        .vault
        .update_credentials(SyncCredential { sync_info, is_new })
        .await
        .context("failed to link account")?;
    println!("Linked. Vault is {}.", runtime.vault.state());
    Ok(())
}

pub async fn unlock(runtime: &VaultRuntime) -> Result<()> {
    match runtime.vault.unlock().await {
        Ok(()) => {
            println!("Unlocked.");
            Ok(())
        }
        Err(VaultError::Unprepared) => bail!("no account linked; run `lockwise link` first"),
        Err(e) => Err(e).context("failed to unlock"),
    }
}

pub async fn lock(runtime: &VaultRuntime) -> Result<()> {
    runtime.vault.lock().await;
    println!("Vault is {}.", runtime.vault.state());
    Ok(())
}

pub async fn reset(runtime: &VaultRuntime) -> Result<()> {
    runtime.vault.reset().await.context("failed to reset vault")?;
    println!("Local data wiped.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub async fn list(runtime: &VaultRuntime) -> Result<()> {
    let credentials = runtime.vault.list().await.context("failed to list logins")?;
    if credentials.is_empty() {
        println!("No logins stored.");
        return Ok(());
    }
    for c in &credentials {
        println!(
            "  {}  {:<32} {:<24} used {}",
            c.id,
            c.hostname,
            c.username.as_deref().unwrap_or("-"),
            c.times_used
        );
    }
    Ok(())
}

pub async fn touch(runtime: &VaultRuntime, id: String) -> Result<()> {
    runtime.vault.touch(id).await.context("failed to record use")?;
    Ok(())
}

pub async fn add(runtime: &VaultRuntime, credential: NewCredential) -> Result<()> {
    let id = runtime.vault.add(credential).await.context("failed to add login")?;
    println!("{id}");
    Ok(())
}

pub async fn delete(runtime: &VaultRuntime, id: String) -> Result<()> {
    if !runtime.vault.delete(id.clone()).await.context("failed to delete login")? {
        bail!("no login with id {id}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings and identity index
// ---------------------------------------------------------------------------

pub fn autolock(runtime: &VaultRuntime, setting: Option<String>) -> Result<()> {
    let Some(raw) = setting else {
        println!("{}", runtime.autolock.setting());
        return Ok(());
    };

    let setting: AutoLockSetting = raw.parse()?;
    runtime
        .settings
        .set_auto_lock_setting(setting)
        .context("failed to save auto-lock setting")?;
    runtime.publish(SettingChangedEvent::AutoLockTime(setting));
    println!("Auto-lock set to {setting}.");
    Ok(())
}

pub async fn identities(runtime: &VaultRuntime, clear: bool) -> Result<()> {
    if clear {
        runtime
            .provider_sync
            .clear()
            .await
            .context("failed to clear identity index")?;
        println!("Identity index cleared.");
        return Ok(());
    }

    let state = runtime
        .provider_sync
        .refresh()
        .await
        .context("failed to refresh identity index")?;
    println!("Identity index: {state:?}");
    Ok(())
}
