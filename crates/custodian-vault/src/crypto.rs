//! Per-record key derivation and Fernet-style authenticated encryption.
//!
//! This module provides the cryptographic primitives for the vault:
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 (via `ring`) turns the master
//!   passphrase and a record's salt into 32 bytes of key material. The first
//!   16 bytes key the HMAC, the last 16 bytes key AES-128.
//! - **Encryption/decryption**: AES-128-CBC with PKCS#7 padding, followed by
//!   an HMAC-SHA256 tag over the whole token (encrypt-then-MAC). The tag is
//!   verified in constant time before any decryption is attempted.
//! - **Randomness**: salts and IVs come from `ring`'s system CSPRNG.
//!
//! # Token layout
//!
//! ```text
//! [1 byte : version 0x80]
//! [8 bytes: unix timestamp, big endian]
//! [16 bytes: AES-CBC IV]
//! [n*16 bytes: ciphertext]
//! [32 bytes: HMAC-SHA256 over everything above]
//! ```
//!
//! The whole token is URL-safe base64 with padding, which makes it
//! interchangeable with Fernet tokens produced by other implementations.

use std::num::NonZeroU32;

use aes::Aes128;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::hmac;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Length of the derived key material in bytes (signing half + cipher half).
pub const KEY_LEN: usize = 32;

/// Length of the per-record PBKDF2 salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the AES-CBC initialisation vector in bytes.
pub const IV_LEN: usize = 16;

/// PBKDF2 iteration count for current-format records (OWASP 2023).
pub const CURRENT_KDF_ITERATIONS: u32 = 600_000;

/// PBKDF2 iteration count used by legacy-format records.
pub const LEGACY_KDF_ITERATIONS: u32 = 100_000;

/// Algorithm label recorded on every record written by this crate.
pub const ALGORITHM: &str = "AES-128-CBC+HMAC-SHA256";

/// PBKDF2 algorithm: HMAC-SHA256.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

const TOKEN_VERSION: u8 = 0x80;
const TIMESTAMP_LEN: usize = 8;
const TAG_LEN: usize = 32;
const BLOCK_LEN: usize = 16;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive 32 bytes of key material from `passphrase`, `salt` and
/// `iterations` using PBKDF2-HMAC-SHA256.
///
/// The result is wrapped in [`Zeroizing`] so it is wiped on drop.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] if `iterations` is zero or
/// `salt` is empty.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| VaultError::KeyDerivationFailed {
        reason: "iteration count must be non-zero".into(),
    })?;
    if salt.is_empty() {
        return Err(VaultError::KeyDerivationFailed {
            reason: "salt must not be empty".into(),
        });
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, passphrase, key.as_mut());

    tracing::trace!(iterations = iterations.get(), "derived record key via PBKDF2");
    Ok(key)
}

/// Generate a fresh 256-bit salt.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] if the system CSPRNG fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "failed to generate random salt".into(),
        })?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` and return the base64 token.
///
/// A random IV is drawn for every call, so encrypting the same plaintext
/// twice yields different tokens.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the CSPRNG or the cipher
/// setup fails.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random IV".into(),
        })?;

    let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
    encrypt_with(plaintext, key, timestamp, &iv)
}

fn encrypt_with(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    timestamp: u64,
    iv: &[u8; IV_LEN],
) -> Result<String> {
    let (signing_key, encryption_key) = key.split_at(KEY_LEN / 2);

    let ciphertext = Aes128CbcEnc::new_from_slices(encryption_key, iv)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-128-CBC cipher".into(),
        })?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
    token.push(TOKEN_VERSION);
    token.extend_from_slice(&timestamp.to_be_bytes());
    token.extend_from_slice(iv);
    token.extend_from_slice(&ciphertext);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, signing_key);
    let tag = hmac::sign(&mac_key, &token);
    token.extend_from_slice(tag.as_ref());

    tracing::trace!(
        plaintext_len = plaintext.len(),
        token_len = token.len(),
        "encrypted data"
    );

    Ok(URL_SAFE.encode(token))
}

/// Verify and decrypt a token produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the token is malformed, the
/// tag does not verify (wrong key or tampering), or the padding is invalid.
pub fn decrypt(token: &str, key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let raw = URL_SAFE
        .decode(token.trim())
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "token is not valid base64".into(),
        })?;

    if raw.len() < HEADER_LEN + BLOCK_LEN + TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("token is too short ({} bytes)", raw.len()),
        });
    }
    if raw[0] != TOKEN_VERSION {
        return Err(VaultError::DecryptionFailed {
            reason: format!("unsupported token version 0x{:02x}", raw[0]),
        });
    }

    let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
    let (signing_key, encryption_key) = key.split_at(KEY_LEN / 2);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, signing_key);
    hmac::verify(&mac_key, signed, tag).map_err(|_| VaultError::DecryptionFailed {
        reason: "authentication failed: wrong key or corrupted data".into(),
    })?;

    let iv = &signed[1 + TIMESTAMP_LEN..HEADER_LEN];
    let ciphertext = &signed[HEADER_LEN..];
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(VaultError::DecryptionFailed {
            reason: "ciphertext is not a whole number of blocks".into(),
        });
    }

    let plaintext = Aes128CbcDec::new_from_slices(encryption_key, iv)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "failed to create AES-128-CBC cipher".into(),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "invalid padding".into(),
        })?;

    tracing::trace!(
        token_len = raw.len(),
        plaintext_len = plaintext.len(),
        "decrypted data"
    );

    Ok(plaintext)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
