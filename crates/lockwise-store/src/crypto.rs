//! AES-256-GCM sealing and key material helpers built on `ring`.
//!
//! - Per-field authenticated encryption with a fresh random 96-bit nonce.
//! - PBKDF2-HMAC-SHA256 for the file keychain's device-derived key.
//! - Generation and decoding of the random database key that the keychain
//!   holds for a linked profile.

use std::num::NonZeroU32;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{StoreError, StoreResult};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 32;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// OWASP 2023 recommendation for HMAC-SHA256.
const PBKDF2_ITERATIONS: u32 = 600_000;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// Yields exactly one nonce, then errors. Each key is bound for one call.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with `key`, returning `(nonce, ciphertext || tag)`.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> StoreResult<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    check_key_len(key).map_err(|reason| StoreError::EncryptionFailed { reason })?;

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| StoreError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| StoreError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce(Some(nonce_bytes)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| StoreError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (including the tag) sealed under `nonce` and `key`.
///
/// A wrong key and tampered data are indistinguishable; both surface as
/// [`StoreError::DecryptionFailed`].
pub fn decrypt(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &[u8]) -> StoreResult<Vec<u8>> {
    check_key_len(key).map_err(|reason| StoreError::DecryptionFailed { reason })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| StoreError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce(Some(*nonce)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| StoreError::DecryptionFailed {
            reason: "authentication failed (wrong key or corrupted data)".into(),
        })?;

    Ok(plaintext.to_vec())
}

/// Convert a stored nonce blob back into a fixed array.
pub fn nonce_from_slice(bytes: &[u8]) -> StoreResult<[u8; NONCE_LEN_BYTES]> {
    bytes
        .try_into()
        .map_err(|_| StoreError::DecryptionFailed {
            reason: format!("nonce must be {NONCE_LEN_BYTES} bytes, got {}", bytes.len()),
        })
}

fn check_key_len(key: &[u8]) -> Result<(), String> {
    if key.len() == KEY_LEN {
        Ok(())
    } else {
        Err(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
    }
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Fill a fresh buffer of `len` bytes from the system CSPRNG.
pub fn random_bytes(len: usize) -> StoreResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| StoreError::KeyDerivationFailed {
            reason: "system random source failed".into(),
        })?;
    Ok(buf)
}

/// Generate a new database key, encoded as base64 for keychain storage.
pub fn generate_database_key() -> StoreResult<String> {
    Ok(BASE64.encode(random_bytes(KEY_LEN)?))
}

/// Decode a database key produced by [`generate_database_key`].
pub fn decode_database_key(encoded: &str) -> StoreResult<Vec<u8>> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| StoreError::InvalidKey {
            reason: format!("not valid base64: {e}"),
        })?;
    if raw.len() != KEY_LEN {
        return Err(StoreError::InvalidKey {
            reason: format!("expected {KEY_LEN} bytes, got {}", raw.len()),
        });
    }
    Ok(raw)
}

/// Derive a 256-bit key from `password` and a known `salt`.
pub fn derive_key_with_salt(password: &[u8], salt: &[u8], out: &mut [u8; KEY_LEN]) {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, password, out);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
