//! SQLite-backed [`CredentialStore`].
//!
//! One file per profile at `<data_dir>/<profile>.logins.db`.  Hostnames and
//! usernames are stored in the clear so the file can be indexed; passwords
//! are sealed per row with AES-256-GCM under the database key.  A sealed
//! canary in the `meta` table lets `ensure_unlocked` reject a wrong key
//! before any record is touched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::credential::{Credential, CredentialStore, NewCredential, SyncUnlockInfo};
use crate::crypto;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::migration::LOGINS_MIGRATIONS;

const CANARY_KEY: &str = "canary";
const CANARY_PLAINTEXT: &[u8] = b"lockwise-logins-v1";
const LAST_SYNC_KEY: &str = "last_sync";
const SYNC_KID_KEY: &str = "sync_kid";

/// Suffixes SQLite may leave next to the main file in WAL mode.
const SIDECAR_SUFFIXES: [&str; 3] = ["", "-wal", "-shm"];

/// Encrypted logins engine backed by one SQLite file per profile.
pub struct SqliteLoginStore {
    data_dir: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Remembered across `close` so `wipe_local` knows which files to remove.
    profile: Option<String>,
    db: Option<Database>,
    key: Option<Vec<u8>>,
}

impl SqliteLoginStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Location of the logins file for `profile`.
    pub fn path_for(data_dir: &Path, profile: &str) -> PathBuf {
        data_dir.join(format!("{profile}.logins.db"))
    }

    /// Database and key, or the reason they are not both available.
    async fn unlocked(&self) -> StoreResult<(Database, Vec<u8>)> {
        let inner = self.inner.lock().await;
        let db = inner.db.clone().ok_or(StoreError::NotOpen)?;
        let key = inner.key.clone().ok_or(StoreError::Locked)?;
        Ok((db, key))
    }
}

#[async_trait]
impl CredentialStore for SqliteLoginStore {
    #[instrument(skip(self))]
    async fn open(&self, profile: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.db.is_some() && inner.profile.as_deref() == Some(profile) {
            debug!("logins store already open");
            return Ok(());
        }

        let path = Self::path_for(&self.data_dir, profile);
        let db = Database::open_and_migrate(path.clone(), LOGINS_MIGRATIONS).await?;

        inner.db = Some(db);
        inner.key = None;
        inner.profile = Some(profile.to_string());
        info!(path = %path.display(), "logins store opened");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.db.take().is_some() {
            info!("logins store closed");
        }
        inner.key = None;
        Ok(())
    }

    async fn is_locked(&self) -> bool {
        self.inner.lock().await.key.is_none()
    }

    #[instrument(skip(self, key))]
    async fn ensure_unlocked(&self, key: &str) -> StoreResult<()> {
        let raw = crypto::decode_database_key(key)?;

        let mut inner = self.inner.lock().await;
        let db = inner.db.clone().ok_or(StoreError::NotOpen)?;
        if inner.key.as_deref() == Some(raw.as_slice()) {
            return Ok(());
        }

        let candidate = raw.clone();
        db.execute(move |conn| {
            let existing: Option<Vec<u8>> = match conn.query_row(
                "SELECT value FROM meta WHERE key = ?1",
                rusqlite::params![CANARY_KEY],
                |row| row.get(0),
            ) {
                Ok(v) => Some(v),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };

            match existing {
                Some(blob) => {
                    if blob.len() < crypto::NONCE_LEN_BYTES {
                        return Err(StoreError::InvalidKey {
                            reason: "canary is corrupted".into(),
                        });
                    }
                    let (nonce, sealed) = blob.split_at(crypto::NONCE_LEN_BYTES);
                    let nonce = crypto::nonce_from_slice(nonce)?;
                    match crypto::decrypt(&nonce, sealed, &candidate) {
                        Ok(plain) if plain == CANARY_PLAINTEXT => Ok(()),
                        _ => Err(StoreError::InvalidKey {
                            reason: "key does not match this store".into(),
                        }),
                    }
                }
                None => {
                    let (nonce, sealed) = crypto::encrypt(CANARY_PLAINTEXT, &candidate)?;
                    let mut blob = nonce.to_vec();
                    blob.extend_from_slice(&sealed);
                    conn.execute(
                        "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                        rusqlite::params![CANARY_KEY, blob],
                    )?;
                    debug!("canary written for new logins store");
                    Ok(())
                }
            }
        })
        .await?;

        inner.key = Some(raw);
        info!("logins store unlocked");
        Ok(())
    }

    async fn ensure_locked(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.key.take().is_some() {
            info!("logins store locked");
        }
        Ok(())
    }

    #[instrument(skip(self, info), fields(kid = %info.kid))]
    async fn sync(&self, info: &SyncUnlockInfo) -> StoreResult<()> {
        let (db, _key) = self.unlocked().await?;

        let url = Url::parse(&info.token_server_url).map_err(|e| StoreError::SyncFailed {
            reason: format!("invalid token server url: {e}"),
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(StoreError::SyncFailed {
                reason: format!("unsupported token server scheme: {}", url.scheme()),
            });
        }
        if info.access_token.is_empty() || info.sync_key.is_empty() {
            return Err(StoreError::SyncFailed {
                reason: "missing access token or sync key".into(),
            });
        }

        let kid = info.kid.clone();
        let now = Utc::now().timestamp();
        db.execute(move |conn| {
            for (key, value) in [(LAST_SYNC_KEY, now.to_string()), (SYNC_KID_KEY, kid)] {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![key, value.into_bytes()],
                )?;
            }
            Ok(())
        })
        .await?;

        info!(host = url.host_str().unwrap_or(""), "sync recorded");
        Ok(())
    }

    async fn wipe_local(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.db = None;
        inner.key = None;

        let Some(profile) = inner.profile.clone() else {
            debug!("wipe requested before any profile was opened");
            return Ok(());
        };

        let base = Self::path_for(&self.data_dir, &profile);
        for suffix in SIDECAR_SUFFIXES {
            let mut path = base.clone().into_os_string();
            path.push(suffix);
            let path = PathBuf::from(path);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove logins file");
                    return Err(e.into());
                }
            }
        }

        info!(profile = %profile, "local logins wiped");
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        let (db, key) = self.unlocked().await?;
        db.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hostname, username, password_nonce, password_enc, last_used, times_used \
                 FROM logins ORDER BY hostname, id",
            )?;
            let rows = stmt.query_map([], RawRow::from_row)?;
            let credentials = rows
                .map(|row| row?.decrypt(&key))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(credentials)
        })
        .await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Credential>> {
        let (db, key) = self.unlocked().await?;
        let id = id.to_string();
        db.execute(move |conn| {
            let result = conn.query_row(
                "SELECT id, hostname, username, password_nonce, password_enc, last_used, times_used \
                 FROM logins WHERE id = ?1",
                rusqlite::params![id],
                RawRow::from_row,
            );
            match result {
                Ok(row) => row.decrypt(&key).map(Some),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn touch(&self, id: &str) -> StoreResult<()> {
        let (db, _key) = self.unlocked().await?;
        let id = id.to_string();
        let now = Utc::now().timestamp();
        db.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE logins SET last_used = ?1, times_used = times_used + 1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "login",
                    id,
                });
            }
            Ok(())
        })
        .await
    }

    async fn add(&self, credential: NewCredential) -> StoreResult<String> {
        if credential.hostname.trim().is_empty() {
            return Err(StoreError::InvalidArgument("hostname must not be empty".into()));
        }
        let (db, key) = self.unlocked().await?;

        let id = Uuid::now_v7().to_string();
        let (nonce, sealed) = crypto::encrypt(credential.password.as_bytes(), &key)?;
        let now = Utc::now().timestamp();
        let row_id = id.clone();
        db.execute(move |conn| {
            conn.execute(
                "INSERT INTO logins (id, hostname, username, password_nonce, password_enc, created_at, password_changed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    row_id,
                    credential.hostname,
                    credential.username,
                    nonce.to_vec(),
                    sealed,
                    now
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!(id = %id, "login added");
        Ok(id)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let (db, _key) = self.unlocked().await?;
        let id = id.to_string();
        db.execute(move |conn| {
            let deleted = conn.execute("DELETE FROM logins WHERE id = ?1", rusqlite::params![id])?;
            Ok(deleted > 0)
        })
        .await
    }
}

// ── row mapping ──────────────────────────────────────────────────────

struct RawRow {
    id: String,
    hostname: String,
    username: Option<String>,
    nonce: Vec<u8>,
    sealed: Vec<u8>,
    last_used: Option<i64>,
    times_used: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            hostname: row.get(1)?,
            username: row.get(2)?,
            nonce: row.get(3)?,
            sealed: row.get(4)?,
            last_used: row.get(5)?,
            times_used: row.get(6)?,
        })
    }

    fn decrypt(self, key: &[u8]) -> StoreResult<Credential> {
        let nonce = crypto::nonce_from_slice(&self.nonce)?;
        let password = String::from_utf8(crypto::decrypt(&nonce, &self.sealed, key)?)
            .map_err(|_| StoreError::DecryptionFailed {
                reason: format!("password for {} is not valid UTF-8", self.id),
            })?;
        Ok(Credential {
            id: self.id,
            hostname: self.hostname,
            username: self.username,
            password,
            last_used: self.last_used.and_then(timestamp),
            times_used: self.times_used,
        })
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ── tests ────────────────────────────────────────────────────────────
