//! Encrypted token storage for OAuth credentials.
//!
//! This module keeps the per-owner credential records produced by the OAuth
//! flow. Token material is sealed with AES-256-GCM before it is stored and is
//! only ever opened again inside [`CryptoBox::decrypt`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - commit / get / revoke                 │
//! │  - single-flight refresh per owner       │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CryptoBox                          │
//! │  - AES-256-GCM                           │
//! │  - Unique nonce per payload              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Tokens are encrypted at rest, each with its own nonce
//! - Master key must be 32 bytes (256 bits) and lives in memory only
//! - Without a key the store fails closed (`AuthError::Configuration`)
//! - `expires_at` always comes from the provider's reported TTL

use chrono::{DateTime, Utc};
use serde::Serialize;

mod encryption;
mod token_store;

pub use encryption::{generate_key, validate_key, CryptoBox};
pub use token_store::TokenStore;

/// Credential record for one owner.
///
/// Holds sealed token material only. The plaintext tokens are recovered
/// through the owning [`TokenStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    /// Canonical identifier reported by the identity provider
    pub owner_id: String,

    /// Sealed access token
    pub access_token_cipher: Vec<u8>,

    /// Sealed refresh token, if the provider issued one
    pub refresh_token_cipher: Option<Vec<u8>>,

    /// When the current access token was issued (UTC)
    pub issued_at: DateTime<Utc>,

    /// When the current access token expires (UTC), `issued_at + ttl`
    pub expires_at: DateTime<Utc>,

    /// Scopes the provider actually granted
    pub granted_scopes: Vec<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token_cipher.is_some()
    }

    /// Non-secret view of the record, safe to serialize and log.
    pub fn summary(&self) -> TokenSummary {
        TokenSummary {
            owner_id: self.owner_id.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            refreshable: self.is_refreshable(),
            granted_scopes: self.granted_scopes.clone(),
        }
    }
}

/// Public metadata of a [`TokenRecord`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub owner_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refreshable: bool,
    pub granted_scopes: Vec<String>,
}
