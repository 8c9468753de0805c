//! Pending authorization requests for CSRF protection.
//!
//! Each authorization request gets an unguessable state token which must come
//! back, exactly once and before it expires, on the provider callback.

use crate::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

/// Random bytes per state token (256 bits)
const STATE_BYTES: usize = 32;

/// Authorization request awaiting its callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl PendingAuthorization {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Single-use state store with expiration.
///
/// Cloning is cheap and shares the underlying map, so the background sweep
/// and the coordinator can hold the same store.
#[derive(Clone)]
pub struct PendingAuthStore {
    pending: Arc<DashMap<String, PendingAuthorization>>,
    ttl: Duration,
}

impl PendingAuthStore {
    /// Create a new store
    ///
    /// # Arguments
    /// * `ttl` - How long a state token remains valid (default: 10 minutes)
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a new state token and record the pending request.
    ///
    /// Expired entries are swept first so the map stays bounded even when
    /// the background task is not running.
    pub fn create(&self, scopes: Vec<String>) -> PendingAuthorization {
        self.cleanup_expired();

        let created_at = Utc::now();
        let pending = PendingAuthorization {
            state: generate_state_token(),
            created_at,
            expires_at: created_at + self.ttl,
            scopes,
        };

        self.pending.insert(pending.state.clone(), pending.clone());
        pending
    }

    /// Validate and consume a state token.
    ///
    /// The entry is removed atomically whether or not it is still fresh, so a
    /// token can never be redeemed twice.
    pub fn consume(&self, state: &str) -> Result<PendingAuthorization, AuthError> {
        let (_, pending) = self
            .pending
            .remove(state)
            .ok_or_else(unknown_or_expired)?;

        if pending.is_expired(Utc::now()) {
            debug!(expired_at = %pending.expires_at, "Rejected expired OAuth state");
            return Err(unknown_or_expired());
        }

        Ok(pending)
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.pending.len();
        let now = Utc::now();
        self.pending.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.pending.len())
    }

    /// Count of outstanding requests (for monitoring)
    pub fn count(&self) -> usize {
        self.pending.len()
    }
}

fn unknown_or_expired() -> AuthError {
    AuthError::Csrf("unknown or expired state".to_string())
}

fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Background task to periodically sweep expired pending requests
pub async fn run_pending_cleanup(store: PendingAuthStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        let removed = store.cleanup_expired();
        tracing::debug!(
            removed,
            remaining = store.count(),
            "Pending authorization cleanup complete"
        );
    }
}
