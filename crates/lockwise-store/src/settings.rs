//! Persisted preferences shared between the app and its extensions.
//!
//! Values are plain strings keyed by [`SettingKey`].  The auto-lock deadline
//! lives here too so a restarted process, or a credential-provider extension
//! running in another process, sees the same instant.

use std::collections::HashMap;
use std::sync::Mutex;

use lockwise_kernel::{AutoLockSetting, SettingChangedEvent};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Keys understood by every [`SettingsStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    AutoLockTime,
    /// Absolute seconds since the epoch at which the vault must lock.
    AutoLockTimerDate,
    PreferredBrowser,
    RecordUsageData,
    ItemListSort,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoLockTime => "autoLockTime",
            Self::AutoLockTimerDate => "autoLockTimerDate",
            Self::PreferredBrowser => "preferredBrowser",
            Self::RecordUsageData => "recordUsageData",
            Self::ItemListSort => "itemListSort",
        }
    }

    /// Keys cleared by a preference reset. The deadline is not a preference.
    pub const PREFERENCES: [SettingKey; 4] = [
        SettingKey::AutoLockTime,
        SettingKey::PreferredBrowser,
        SettingKey::RecordUsageData,
        SettingKey::ItemListSort,
    ];
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Synchronous key/value preference storage.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: SettingKey) -> StoreResult<Option<String>>;

    fn set(&self, key: SettingKey, value: &str) -> StoreResult<()>;

    fn remove(&self, key: SettingKey) -> StoreResult<()>;

    /// `None` if missing or not an integer.
    fn get_i64(&self, key: SettingKey) -> StoreResult<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| v.parse().ok()))
    }

    fn set_i64(&self, key: SettingKey, value: i64) -> StoreResult<()> {
        self.set(key, &value.to_string())
    }

    /// The configured auto-lock duration. Missing or unknown values fall back
    /// to the default.
    fn auto_lock_setting(&self) -> StoreResult<AutoLockSetting> {
        let Some(raw) = self.get(SettingKey::AutoLockTime)? else {
            return Ok(AutoLockSetting::default());
        };
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "unknown auto-lock setting persisted, using default");
            AutoLockSetting::default()
        }))
    }

    fn set_auto_lock_setting(&self, setting: AutoLockSetting) -> StoreResult<()> {
        self.set(SettingKey::AutoLockTime, setting.as_str())
    }

    /// Persist a setting change published on the bus.
    fn apply(&self, event: &SettingChangedEvent) -> StoreResult<()> {
        match event {
            SettingChangedEvent::AutoLockTime(setting) => self.set_auto_lock_setting(*setting),
            SettingChangedEvent::PreferredBrowser(browser) => {
                self.set(SettingKey::PreferredBrowser, browser)
            }
            SettingChangedEvent::RecordUsageData(enabled) => {
                self.set(SettingKey::RecordUsageData, if *enabled { "true" } else { "false" })
            }
            SettingChangedEvent::ItemListSort(sort) => self.set(SettingKey::ItemListSort, sort),
            SettingChangedEvent::Reset => {
                for key in SettingKey::PREFERENCES {
                    self.remove(key)?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Settings backed by the `settings` table of a [`Database`] migrated with
/// [`SETTINGS_MIGRATIONS`](crate::migration::SETTINGS_MIGRATIONS).
#[derive(Clone)]
pub struct SqliteSettings {
    db: Database,
}

impl SqliteSettings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: SettingKey) -> StoreResult<Option<String>> {
        self.db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            );
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn set(&self, key: SettingKey, value: &str) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key.as_str(), value, chrono::Utc::now().timestamp()],
            )?;
            debug!(key = key.as_str(), "setting updated");
            Ok(())
        })
    }

    fn remove(&self, key: SettingKey) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM settings WHERE key = ?1",
                rusqlite::params![key.as_str()],
            )?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<SettingKey, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<SettingKey, String>>> {
        self.values
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: SettingKey) -> StoreResult<Option<String>> {
        Ok(self.values()?.get(&key).cloned())
    }

    fn set(&self, key: SettingKey, value: &str) -> StoreResult<()> {
        self.values()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: SettingKey) -> StoreResult<()> {
        self.values()?.remove(&key);
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
