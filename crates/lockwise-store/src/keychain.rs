//! Keychain storage for the database key.
//!
//! The random key that decrypts a profile's logins file lives outside that
//! file.  [`KeychainProvider`] abstracts over where it lives:
//!
//! - **macOS**: Keychain Services via `security-framework`
//! - **Fallback**: a file encrypted with a device-derived key, mode 0600
//! - **Tests**: [`MemoryKeychain`]
//!
//! The device-derived key can be rebuilt by anyone with access to the same
//! account on the same machine.  It keeps the key out of plaintext, nothing
//! more.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::crypto;
use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Secure storage for one profile's database key.
pub trait KeychainProvider: Send + Sync {
    /// Returns [`StoreError::DatabaseKeyNotFound`] if nothing is stored.
    fn get_database_key(&self) -> StoreResult<String>;

    /// Store (or overwrite) the database key.
    fn set_database_key(&self, key: &str) -> StoreResult<()>;

    fn has_database_key(&self) -> StoreResult<bool>;

    /// Delete the stored key. Deleting a missing key is not an error.
    fn delete_database_key(&self) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// File-based fallback
// ---------------------------------------------------------------------------

/// Application salt mixed into the device-derived key. Changing this
/// orphans every stored key file.
const APP_SALT: &[u8; crypto::SALT_LEN] = b"lockwise-keychain-database-key-1";

/// Keychain that stores the database key encrypted with a device-derived key.
///
/// File layout:
/// ```text
/// [12 bytes: AES-256-GCM nonce]
/// [remaining: ciphertext + 16-byte tag]
/// ```
pub struct FileKeychain {
    key_file: PathBuf,
    device_key: OnceLock<[u8; crypto::KEY_LEN]>,
}

impl FileKeychain {
    /// The parent directory is created on first write.
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            device_key: OnceLock::new(),
        }
    }

    /// Default key file location: `<data_dir>/database.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("database.key")
    }

    pub fn path(&self) -> &Path {
        &self.key_file
    }

    /// PBKDF2 over hostname + username + app salt, computed once per
    /// instance.
    fn device_derived_key(&self) -> &[u8; crypto::KEY_LEN] {
        self.device_key.get_or_init(|| {
            let hostname = Self::get_hostname();
            let username = std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown-user".into());

            let mut material =
                Vec::with_capacity(hostname.len() + username.len() + APP_SALT.len());
            material.extend_from_slice(hostname.as_bytes());
            material.extend_from_slice(username.as_bytes());
            material.extend_from_slice(APP_SALT);

            let mut key = [0u8; crypto::KEY_LEN];
            crypto::derive_key_with_salt(&material, APP_SALT, &mut key);
            key
        })
    }

    fn get_hostname() -> String {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown-host".into())
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown-host".into())
        }
    }
}

impl KeychainProvider for FileKeychain {
    fn get_database_key(&self) -> StoreResult<String> {
        if !self.key_file.exists() {
            return Err(StoreError::DatabaseKeyNotFound);
        }

        let data = std::fs::read(&self.key_file)?;
        if data.len() < crypto::NONCE_LEN_BYTES + crypto::TAG_LEN {
            return Err(StoreError::DecryptionFailed {
                reason: "database key file is truncated".into(),
            });
        }

        let (nonce_bytes, ciphertext) = data.split_at(crypto::NONCE_LEN_BYTES);
        let nonce = crypto::nonce_from_slice(nonce_bytes)?;
        let plaintext = crypto::decrypt(&nonce, ciphertext, self.device_derived_key())?;

        String::from_utf8(plaintext).map_err(|_| StoreError::DecryptionFailed {
            reason: "database key is not valid UTF-8".into(),
        })
    }

    fn set_database_key(&self, key: &str) -> StoreResult<()> {
        let (nonce, ciphertext) = crypto::encrypt(key.as_bytes(), self.device_derived_key())?;

        let mut data = Vec::with_capacity(nonce.len() + ciphertext.len());
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);

        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.key_file, &data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.key_file, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %self.key_file.display(), "stored database key in file keychain");
        Ok(())
    }

    fn has_database_key(&self) -> StoreResult<bool> {
        Ok(self.key_file.exists())
    }

    fn delete_database_key(&self) -> StoreResult<()> {
        if self.key_file.exists() {
            std::fs::remove_file(&self.key_file)?;
            tracing::info!(path = %self.key_file.display(), "deleted database key from file keychain");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// macOS Keychain Services
// ---------------------------------------------------------------------------

/// `errSecItemNotFound`.
#[cfg(target_os = "macos")]
const MACOS_ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Generic-password item in the user's login keychain.
#[cfg(target_os = "macos")]
pub struct MacOSKeychain {
    service_name: String,
    account_name: String,
}

#[cfg(target_os = "macos")]
impl MacOSKeychain {
    const DEFAULT_SERVICE: &'static str = "org.lockwise.vault";

    /// One keychain item per profile.
    pub fn for_profile(profile: &str) -> Self {
        Self {
            service_name: Self::DEFAULT_SERVICE.to_string(),
            account_name: format!("{profile}.database-key"),
        }
    }
}

#[cfg(target_os = "macos")]
impl KeychainProvider for MacOSKeychain {
    fn get_database_key(&self) -> StoreResult<String> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service_name, &self.account_name) {
            Ok(data) => String::from_utf8(data).map_err(|_| StoreError::DecryptionFailed {
                reason: "database key is not valid UTF-8".into(),
            }),
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => {
                Err(StoreError::DatabaseKeyNotFound)
            }
            Err(e) => Err(StoreError::KeychainUnavailable {
                reason: format!("macOS keychain read failed: {e}"),
            }),
        }
    }

    fn set_database_key(&self, key: &str) -> StoreResult<()> {
        use security_framework::passwords::set_generic_password;

        set_generic_password(&self.service_name, &self.account_name, key.as_bytes()).map_err(
            |e| StoreError::KeychainUnavailable {
                reason: format!("macOS keychain write failed: {e}"),
            },
        )?;

        tracing::info!(account = %self.account_name, "stored database key in macOS keychain");
        Ok(())
    }

    fn has_database_key(&self) -> StoreResult<bool> {
        match self.get_database_key() {
            Ok(_) => Ok(true),
            Err(StoreError::DatabaseKeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_database_key(&self) -> StoreResult<()> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service_name, &self.account_name) {
            Ok(()) => {
                tracing::info!(account = %self.account_name, "deleted database key from macOS keychain");
                Ok(())
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(StoreError::KeychainUnavailable {
                reason: format!("macOS keychain delete failed: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keychain that forgets everything when dropped.
#[derive(Default)]
pub struct MemoryKeychain {
    key: Mutex<Option<String>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> StoreResult<std::sync::MutexGuard<'_, Option<String>>> {
        self.key.lock().map_err(|e| StoreError::KeychainUnavailable {
            reason: format!("mutex poisoned: {e}"),
        })
    }
}

impl KeychainProvider for MemoryKeychain {
    fn get_database_key(&self) -> StoreResult<String> {
        self.slot()?.clone().ok_or(StoreError::DatabaseKeyNotFound)
    }

    fn set_database_key(&self, key: &str) -> StoreResult<()> {
        *self.slot()? = Some(key.to_string());
        Ok(())
    }

    fn has_database_key(&self) -> StoreResult<bool> {
        Ok(self.slot()?.is_some())
    }

    fn delete_database_key(&self) -> StoreResult<()> {
        *self.slot()? = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Best available keychain for this platform.
///
/// `data_dir` is only used by the file fallback; `profile` only by the
/// macOS backend.
pub fn platform_keychain(data_dir: &Path, profile: &str) -> Arc<dyn KeychainProvider> {
    let _ = (&data_dir, &profile);

    #[cfg(target_os = "macos")]
    {
        tracing::info!("using macOS Keychain Services for database key storage");
        Arc::new(MacOSKeychain::for_profile(profile))
    }
    #[cfg(not(target_os = "macos"))]
    {
        let path = FileKeychain::default_path(data_dir);
        tracing::info!(path = %path.display(), "using file-based keychain for database key storage");
        Arc::new(FileKeychain::new(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
