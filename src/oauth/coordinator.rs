//! Authorization-code flow state machine.
//!
//! ```text
//! UNAUTHENTICATED ──initiate──▶ AWAITING_CALLBACK ──handle_callback──▶ AUTHENTICATED
//!        ▲                                                               │
//!        └───────────── logout / irrecoverable refresh failure ──────────┘
//! ```
//!
//! An expired record that still carries a refresh token reads as *stale*; it
//! is renewed lazily the next time [`OAuthCoordinator::authorized_request`] needs it.

use super::pending::PendingAuthStore;
use super::provider::{with_deadline, IdentityProvider};
use crate::config::OAuthConfig;
use crate::credentials::TokenStore;
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where to send the user to authorize.
#[derive(Clone, Debug, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a successful callback.
#[derive(Clone, Debug, Serialize)]
pub struct CallbackOutcome {
    pub owner_id: String,
    pub profile: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

/// Read-state of an owner's credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// Expired, but a refresh token is on record
    Stale,
}

/// Answer to a status query. Never an error, absence reads as unauthenticated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub owner_id: String,
    pub state: AuthState,
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshable: bool,
}

/// Orchestrates the OAuth flow over injected stores and provider.
pub struct OAuthCoordinator {
    /// Set only when both client id and secret are configured
    client_id: Option<String>,
    redirect_uri: String,
    default_scopes: Vec<String>,
    pending: PendingAuthStore,
    tokens: Arc<TokenStore>,
    provider: Arc<dyn IdentityProvider>,
    upstream_timeout: Duration,
}

impl OAuthCoordinator {
    pub fn new(
        config: &OAuthConfig,
        pending: PendingAuthStore,
        tokens: Arc<TokenStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let client_id = if config.has_client_credentials() {
            config.client_id.clone()
        } else {
            None
        };

        Self {
            client_id,
            redirect_uri: config.redirect_uri.clone(),
            default_scopes: config.scopes.clone(),
            pending,
            tokens,
            provider,
            upstream_timeout: Duration::from_secs(config.upstream_timeout_seconds),
        }
    }

    /// Overrides the per-call deadline for provider round-trips.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// True when client credentials and a secret key are both configured.
    pub fn is_enabled(&self) -> bool {
        self.ensure_enabled().is_ok()
    }

    fn ensure_enabled(&self) -> Result<&str, AuthError> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            AuthError::Configuration("OAuth client credentials are not configured".to_string())
        })?;
        if !self.tokens.is_enabled() {
            return Err(AuthError::Configuration(
                "no secret key configured for token encryption".to_string(),
            ));
        }
        Ok(client_id)
    }

    pub fn pending(&self) -> &PendingAuthStore {
        &self.pending
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Starts an authorization request.
    ///
    /// Empty `scopes` falls back to the configured defaults.
    pub fn initiate(&self, scopes: &[String]) -> Result<AuthorizationRequest, AuthError> {
        let client_id = self.ensure_enabled().map_err(|e| {
            warn!(error = %e, "OAuth initiate refused, feature disabled");
            e
        })?;

        let scopes = if scopes.is_empty() {
            self.default_scopes.clone()
        } else {
            scopes.to_vec()
        };

        let pending = self.pending.create(scopes);
        let url = self.provider.build_authorization_url(
            client_id,
            &self.redirect_uri,
            &pending.scopes,
            &pending.state,
        );

        debug!(state = %pending.state, scopes = ?pending.scopes, "Issued OAuth state");
        info!(expires_at = %pending.expires_at, "Redirecting to OAuth provider");

        Ok(AuthorizationRequest {
            url,
            state: pending.state,
            expires_at: pending.expires_at,
        })
    }

    /// Completes the flow for a provider callback.
    ///
    /// The state is consumed before anything else, so it is spent whether the
    /// exchange succeeds or not. The owner id is whatever the provider reports
    /// for the new access token.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<CallbackOutcome, AuthError> {
        let pending = self.pending.consume(state).map_err(|e| {
            warn!("Invalid or expired OAuth state (possible CSRF attack)");
            e
        })?;
        self.ensure_enabled()?;

        debug!("CSRF state validated, exchanging authorization code");

        let grant = with_deadline(
            self.upstream_timeout,
            "token exchange",
            self.provider.exchange_code(code, &self.redirect_uri),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Token exchange failed");
            e
        })?;

        let identity = with_deadline(
            self.upstream_timeout,
            "identity fetch",
            self.provider.fetch_identity(&grant.access_token),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Identity fetch failed");
            e
        })?;

        let scopes = if grant.granted_scopes.is_empty() {
            pending.scopes
        } else {
            grant.granted_scopes
        };

        let record = self.tokens.commit(
            &identity.owner_id,
            &grant.access_token,
            grant.refresh_token.as_deref(),
            grant.expires_in,
            scopes,
        )?;

        info!(
            owner_id = %identity.owner_id,
            has_refresh_token = record.is_refreshable(),
            "OAuth flow completed successfully"
        );

        Ok(CallbackOutcome {
            owner_id: identity.owner_id,
            profile: identity.profile,
            expires_at: record.expires_at,
        })
    }

    /// Reports the credential state of `owner_id`.
    pub fn status(&self, owner_id: &str) -> AuthStatus {
        let record = self.tokens.get(owner_id).ok();
        let authenticated = self.tokens.is_valid(owner_id);
        let refreshable = record.as_ref().map(|r| r.is_refreshable()).unwrap_or(false);

        let state = match (&record, authenticated) {
            (None, _) => AuthState::Unauthenticated,
            (Some(_), true) => AuthState::Authenticated,
            (Some(_), false) if refreshable => AuthState::Stale,
            (Some(_), false) => AuthState::Unauthenticated,
        };

        AuthStatus {
            owner_id: owner_id.to_string(),
            state,
            authenticated,
            expires_at: record.map(|r| r.expires_at),
            refreshable,
        }
    }

    /// Drops the credentials of `owner_id`. Returns whether any existed.
    pub fn logout(&self, owner_id: &str) -> bool {
        self.tokens.revoke(owner_id)
    }

    /// Runs `action` with a live access token for `owner_id`.
    ///
    /// A stale token is refreshed once first. Credentials that can no longer
    /// be opened are revoked and reported as `Integrity`.
    pub async fn authorized_request<T, F, Fut>(&self, owner_id: &str, action: F) -> Result<T, AuthError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let access_token = self.live_access_token(owner_id).await?;
        Ok(action(access_token).await)
    }

    async fn live_access_token(&self, owner_id: &str) -> Result<String, AuthError> {
        if !self.tokens.is_valid(owner_id) {
            let record = self.tokens.get(owner_id)?;
            if !record.is_refreshable() {
                return Err(AuthError::NotAuthenticated);
            }

            debug!(owner_id = %owner_id, "Access token stale, refreshing before use");
            if let Err(e) = self.tokens.refresh(owner_id).await {
                if matches!(e, AuthError::Integrity(_)) {
                    self.revoke_unreadable(owner_id);
                }
                return Err(e);
            }

            if !self.tokens.is_valid(owner_id) {
                return Err(AuthError::NotAuthenticated);
            }
        }

        self.tokens.access_token(owner_id).map_err(|e| {
            if matches!(e, AuthError::Integrity(_)) {
                self.revoke_unreadable(owner_id);
            }
            e
        })
    }

    fn revoke_unreadable(&self, owner_id: &str) {
        warn!(owner_id = %owner_id, "Stored credentials failed integrity check, revoking");
        self.tokens.revoke(owner_id);
    }
}
