//! Passphrase-based encryption for full-text payloads at rest.
//!
//! Payloads from publishers that require encrypted storage are sealed with
//! XChaCha20-Poly1305 under a key derived from the configured passphrase.
//! The on-disk layout is `magic || nonce || ciphertext`; an empty sentinel
//! file next to the payload marks it as ciphertext (see
//! [`crate::format::Format`]).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"DFE1";
const NONCE_LEN: usize = 24;

/// Errors for payload encryption and decryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("failed to encrypt payload")]
    EncryptionFailed,

    /// The stored payload does not have the expected layout.
    #[error("encrypted payload is malformed")]
    InvalidPayload,

    /// Decryption failed (wrong passphrase or corrupted data).
    #[error("failed to decrypt payload (wrong passphrase or corrupted data)")]
    DecryptionFailed,
}

/// Encrypts `plaintext` under a key derived from `passphrase`.
///
/// A fresh random nonce is generated per call, so encrypting the same
/// payload twice yields different ciphertexts.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the AEAD seal fails.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(passphrase);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypts a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPayload`] for data without the expected
/// layout and [`CryptoError::DecryptionFailed`] when the passphrase is
/// wrong or the ciphertext is corrupted.
pub fn decrypt(payload: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < MAGIC.len() + NONCE_LEN || &payload[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::InvalidPayload);
    }

    let nonce = XNonce::from_slice(&payload[MAGIC.len()..MAGIC.len() + NONCE_LEN]);
    let ciphertext = &payload[MAGIC.len() + NONCE_LEN..];

    cipher_for(passphrase)
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn cipher_for(passphrase: &str) -> XChaCha20Poly1305 {
    let key_bytes = Sha256::digest(passphrase.as_bytes());
    XChaCha20Poly1305::new(Key::from_slice(&key_bytes))
}
