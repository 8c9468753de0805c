//! In-memory encrypted token store with single-flight refresh.
//!
//! Records are keyed by owner id in a sharded concurrent map, so work for one
//! owner never waits on another. Renewals are deduplicated per owner: while a
//! refresh is in flight every other `refresh` call for the same owner joins it
//! and observes the same outcome.

use super::{CryptoBox, TokenRecord};
use crate::error::AuthError;
use crate::oauth::provider::{with_deadline, IdentityProvider, MAX_TOKEN_TTL_SECONDS};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type RenewalFuture = Shared<BoxFuture<'static, Result<TokenRecord, AuthError>>>;

/// Per-owner credential store.
///
/// Explicitly owned and injected into the coordinator; swap it for a
/// persistent backend without touching the flow logic.
///
/// # Thread Safety
/// - Records live in a `DashMap`, sharded by owner id
/// - In-flight renewals are tracked per owner, tagged with a flight id so a
///   finished flight never evicts a newer one
pub struct TokenStore {
    records: Arc<DashMap<String, TokenRecord>>,
    crypto: Arc<CryptoBox>,
    provider: Arc<dyn IdentityProvider>,
    in_flight: DashMap<String, (u64, RenewalFuture)>,
    next_flight: AtomicU64,
    upstream_timeout: Duration,
}

impl TokenStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `crypto` - Box used to seal token material
    /// * `provider` - Identity provider used for renewals
    /// * `upstream_timeout` - Deadline for a single renewal call
    pub fn new(
        crypto: Arc<CryptoBox>,
        provider: Arc<dyn IdentityProvider>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            crypto,
            provider,
            in_flight: DashMap::new(),
            next_flight: AtomicU64::new(0),
            upstream_timeout,
        }
    }

    /// True when the store can seal tokens (a secret key is configured).
    pub fn is_enabled(&self) -> bool {
        self.crypto.is_enabled()
    }

    /// Seals and stores credentials for `owner_id`, replacing any previous record.
    ///
    /// `expires_at` is `now + ttl_seconds`, with the TTL taken verbatim from the provider.
    /// A TTL outside `0..=MAX_TOKEN_TTL_SECONDS` is rejected as `Upstream`.
    pub fn commit(
        &self,
        owner_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        ttl_seconds: i64,
        scopes: Vec<String>,
    ) -> Result<TokenRecord, AuthError> {
        commit_record(
            &self.records,
            &self.crypto,
            owner_id,
            access_token,
            refresh_token,
            ttl_seconds,
            scopes,
        )
    }

    /// Returns the record for `owner_id`, expired or not.
    pub fn get(&self, owner_id: &str) -> Result<TokenRecord, AuthError> {
        self.records
            .get(owner_id)
            .map(|record| record.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    /// True iff a record exists and its access token has not expired.
    pub fn is_valid(&self, owner_id: &str) -> bool {
        self.records
            .get(owner_id)
            .map(|record| !record.is_expired(Utc::now()))
            .unwrap_or(false)
    }

    /// Opens the access token of `owner_id`.
    ///
    /// Does not check expiry; callers decide what to do with a stale token.
    pub(crate) fn access_token(&self, owner_id: &str) -> Result<String, AuthError> {
        let sealed = self
            .records
            .get(owner_id)
            .map(|record| record.access_token_cipher.clone())
            .ok_or(AuthError::NotAuthenticated)?;
        self.crypto.decrypt_str(&sealed)
    }

    /// Renews the access token of `owner_id` through the identity provider.
    ///
    /// Concurrent calls for the same owner share one upstream renewal and all
    /// receive its result. On failure the previous record stays in place.
    pub async fn refresh(&self, owner_id: &str) -> Result<TokenRecord, AuthError> {
        let (flight, renewal) = match self.in_flight.entry(owner_id.to_string()) {
            Entry::Occupied(entry) => {
                debug!(owner_id = %owner_id, "Joining in-flight token refresh");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let renewal = renew(
                    Arc::clone(&self.records),
                    Arc::clone(&self.crypto),
                    Arc::clone(&self.provider),
                    owner_id.to_string(),
                    self.upstream_timeout,
                )
                .boxed()
                .shared();
                entry.insert((flight, renewal.clone()));
                (flight, renewal)
            }
        };

        let result = renewal.await;

        self.in_flight
            .remove_if(owner_id, |_, (current, _)| *current == flight);

        result
    }

    /// Deletes the record for `owner_id`. Idempotent.
    ///
    /// Returns whether a record was present.
    pub fn revoke(&self, owner_id: &str) -> bool {
        let removed = self.records.remove(owner_id).is_some();
        if removed {
            info!(owner_id = %owner_id, "Credentials revoked");
        }
        removed
    }

    /// Stores a record as-is, bypassing encryption.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, record: TokenRecord) {
        self.records.insert(record.owner_id.clone(), record);
    }

    /// Number of owners with a record (valid or not).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn commit_record(
    records: &DashMap<String, TokenRecord>,
    crypto: &CryptoBox,
    owner_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    ttl_seconds: i64,
    scopes: Vec<String>,
) -> Result<TokenRecord, AuthError> {
    let out_of_range = || {
        AuthError::Upstream(format!(
            "provider reported out-of-range token lifetime {}s",
            ttl_seconds
        ))
    };
    if !(0..=MAX_TOKEN_TTL_SECONDS).contains(&ttl_seconds) {
        return Err(out_of_range());
    }
    let ttl = ChronoDuration::try_seconds(ttl_seconds).ok_or_else(out_of_range)?;
    let issued_at = Utc::now();
    let expires_at = issued_at.checked_add_signed(ttl).ok_or_else(out_of_range)?;

    let access_token_cipher = crypto.encrypt_str(access_token)?;
    let refresh_token_cipher = refresh_token
        .map(|token| crypto.encrypt_str(token))
        .transpose()?;

    let record = TokenRecord {
        owner_id: owner_id.to_string(),
        access_token_cipher,
        refresh_token_cipher,
        issued_at,
        expires_at,
        granted_scopes: scopes,
    };

    records.insert(owner_id.to_string(), record.clone());

    debug!(
        owner_id = %owner_id,
        expires_at = %record.expires_at,
        has_refresh_token = record.is_refreshable(),
        "Credentials committed"
    );

    Ok(record)
}

async fn renew(
    records: Arc<DashMap<String, TokenRecord>>,
    crypto: Arc<CryptoBox>,
    provider: Arc<dyn IdentityProvider>,
    owner_id: String,
    upstream_timeout: Duration,
) -> Result<TokenRecord, AuthError> {
    // Copy out what we need; never hold a map guard across an await.
    let (refresh_cipher, previous_scopes) = {
        let record = records.get(&owner_id).ok_or(AuthError::NotAuthenticated)?;
        let cipher = record
            .refresh_token_cipher
            .clone()
            .ok_or(AuthError::NotRefreshable)?;
        (cipher, record.granted_scopes.clone())
    };

    let refresh_token = crypto.decrypt_str(&refresh_cipher)?;

    info!(owner_id = %owner_id, "Refreshing OAuth token");

    let grant = with_deadline(
        upstream_timeout,
        "token refresh",
        provider.refresh_token(&refresh_token),
    )
    .await
    .map_err(|e| {
        warn!(owner_id = %owner_id, error = %e, "Token refresh failed, keeping previous record");
        e
    })?;

    // Keep the existing refresh token if the provider did not rotate it
    let next_refresh = grant.refresh_token.unwrap_or(refresh_token);
    let scopes = if grant.granted_scopes.is_empty() {
        previous_scopes
    } else {
        grant.granted_scopes
    };

    let record = commit_record(
        &records,
        &crypto,
        &owner_id,
        &grant.access_token,
        Some(&next_refresh),
        grant.expires_in,
        scopes,
    )?;

    info!(owner_id = %owner_id, expires_at = %record.expires_at, "OAuth token refreshed successfully");

    Ok(record)
}
