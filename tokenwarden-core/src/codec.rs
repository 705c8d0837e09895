//! Symmetric encryption of stored credentials.
//!
//! Secrets are sealed with AES-256-GCM under a 32-byte [`PasscodeKey`]
//! supplied by the host. The stored form is standard base64 of
//! `nonce || ciphertext || tag`, with a fresh random nonce per call.
//!
//! Key derivation from the user's passcode happens elsewhere; this module
//! only consumes the finished key material.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::store::Secret;

const NONCE_SIZE: usize = 12;

/// Length of [`PasscodeKey`] material in bytes.
pub const KEY_SIZE: usize = 32;

/// Error type for encryption and decryption.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Key material has the wrong length.
    #[error("key material must be {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// Key material is not valid base64.
    #[error("key material is not valid base64")]
    InvalidKeyEncoding(#[source] base64::DecodeError),

    /// Stored ciphertext cannot be decoded at all.
    #[error("malformed ciphertext: {message}")]
    Malformed { message: String },

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    Decryption,

    /// Decrypted bytes are not a UTF-8 string.
    #[error("decrypted secret is not valid UTF-8")]
    InvalidUtf8,

    /// The cipher refused to seal the plaintext.
    #[error("encryption failed")]
    Encryption,
}

/// Passcode-derived key material.
///
/// Wiped on drop. Debug output never shows the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasscodeKey([u8; KEY_SIZE]);

impl PasscodeKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let key: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CodecError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    got: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Parse base64-encoded key material, as hosts pass it over the wire.
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(CodecError::InvalidKeyEncoding)?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Encode the key as base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CodecError> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|_| CodecError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: self.0.len(),
        })
    }
}

impl std::fmt::Debug for PasscodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasscodeKey([REDACTED])")
    }
}

/// Encrypt a secret for storage.
pub fn encrypt(plaintext: &str, key: &PasscodeKey) -> Result<String, CodecError> {
    let cipher = key.cipher()?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CodecError::Encryption)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + sealed.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut sealed);
    Ok(STANDARD.encode(output))
}

/// Decrypt a stored secret.
///
/// Fails with [`CodecError::Decryption`] when the key is wrong, which is
/// how a wrong passcode shows up.
pub fn decrypt(ciphertext: &str, key: &PasscodeKey) -> Result<Secret, CodecError> {
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CodecError::Malformed {
            message: e.to_string(),
        })?;

    if raw.len() <= NONCE_SIZE {
        return Err(CodecError::Malformed {
            message: format!("ciphertext is too short ({} bytes)", raw.len()),
        });
    }

    let (nonce_bytes, payload) = raw.split_at(NONCE_SIZE);
    let cipher = key.cipher()?;
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), payload)
        .map_err(|_| CodecError::Decryption)?;

    match String::from_utf8(std::mem::take(&mut plaintext)) {
        Ok(value) => Ok(Secret::new(value)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(CodecError::InvalidUtf8)
        }
    }
}
