//! AES-256-GCM box for token material at rest.
//!
//! Each payload is sealed with a fresh random nonce which is prepended to the
//! ciphertext, so a sealed value is self-contained: `nonce (12 bytes) || ciphertext+tag`.
//! The master key must be 32 bytes (256 bits), supplied base64-encoded from configuration.

use crate::error::AuthError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fmt;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag
const TAG_SIZE: usize = 16;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded key bytes (32 bytes)
/// * `Err(AuthError::Configuration)` - If key is invalid length or invalid base64
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>, AuthError> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .map_err(|e| AuthError::Configuration(format!("secret key is not valid base64: {}", e)))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(AuthError::Configuration(format!(
            "secret key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Generates a fresh random master key, base64-encoded.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Authenticated encryption of opaque byte payloads under a process-wide key.
///
/// A box built without a key is *disabled*: it fails closed and every
/// `encrypt`/`decrypt` returns [`AuthError::Configuration`] instead of passing
/// plaintext through.
pub struct CryptoBox {
    cipher: Option<Aes256Gcm>,
}

impl CryptoBox {
    /// Creates a box from a base64-encoded 32-byte key.
    pub fn new(key_base64: &str) -> Result<Self, AuthError> {
        let key = validate_key(key_base64)?;
        Self::from_key(&key)
    }

    /// Creates a box from raw key bytes.
    pub fn from_key(key: &[u8]) -> Result<Self, AuthError> {
        if key.len() != KEY_SIZE {
            return Err(AuthError::Configuration(format!(
                "secret key must be {} bytes",
                KEY_SIZE
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AuthError::Configuration(format!("failed to create cipher: {}", e)))?;
        Ok(Self {
            cipher: Some(cipher),
        })
    }

    /// Builds a box from an optional configured secret.
    ///
    /// `None` or a blank secret yields a disabled box; a secret that is present
    /// but malformed is a configuration error.
    pub fn from_config(secret: Option<&str>) -> Result<Self, AuthError> {
        match secret.map(str::trim) {
            Some(s) if !s.is_empty() => Self::new(s),
            _ => Ok(Self::disabled()),
        }
    }

    /// A box with no key. Every operation fails with `Configuration`.
    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    fn cipher(&self) -> Result<&Aes256Gcm, AuthError> {
        self.cipher
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("no secret key configured".to_string()))
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
        let cipher = self.cipher()?;

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AuthError::Configuration(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens a payload produced by [`CryptoBox::encrypt`].
    ///
    /// Fails with `Integrity` when the payload was truncated, tampered with,
    /// or sealed under a different key.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, AuthError> {
        let cipher = self.cipher()?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AuthError::Integrity(format!(
                "sealed payload too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::Integrity("wrong key or corrupted data".to_string()))
    }

    /// Convenience wrapper for UTF-8 secrets such as access tokens.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>, AuthError> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, sealed: &[u8]) -> Result<String, AuthError> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes)
            .map_err(|_| AuthError::Integrity("decrypted data is not valid UTF-8".to_string()))
    }
}

impl fmt::Debug for CryptoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoBox")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
