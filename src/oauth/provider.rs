//! Identity provider interface.
//!
//! The coordinator and the token store never talk HTTP themselves; every
//! provider round-trip goes through an [`IdentityProvider`]. Production uses
//! [`HttpIdentityProvider`](super::HttpIdentityProvider), tests plug in scripted doubles.

use crate::error::AuthError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Result of a successful code exchange or token renewal.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider issued (or rotated) a refresh token
    pub refresh_token: Option<String>,
    /// Time-to-live reported by the provider, in seconds
    pub expires_in: i64,
    /// Scopes granted. Renewals may leave this empty.
    pub granted_scopes: Vec<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

/// Owner identity as reported by the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    /// Canonical, provider-issued identifier of the authenticated user
    pub owner_id: String,
    /// Remaining profile fields (name, email, picture, ...)
    pub profile: Map<String, Value>,
}

/// Third-party OAuth 2.0 identity provider.
///
/// # Example
/// ```no_run
/// use async_trait::async_trait;
/// use jobscout::error::AuthError;
/// use jobscout::oauth::{Identity, IdentityProvider, TokenGrant};
///
/// struct Offline;
///
/// #[async_trait]
/// impl IdentityProvider for Offline {
///     fn build_authorization_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String], state: &str) -> String {
///         format!("https://id.example.com/authorize?client_id={client_id}&state={state}")
///     }
///
///     async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> Result<TokenGrant, AuthError> {
///         Err(AuthError::Upstream("offline".into()))
///     }
///
///     async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
///         Err(AuthError::Upstream("offline".into()))
///     }
///
///     async fn fetch_identity(&self, _access_token: &str) -> Result<Identity, AuthError> {
///         Err(AuthError::Upstream("offline".into()))
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the provider's authorization endpoint URL for a pending request.
    fn build_authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> String;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError>;

    /// Renews an access token using a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// Resolves the owner behind an access token.
    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthError>;
}

/// Longest access-token lifetime accepted from a provider (one year)
pub const MAX_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Awaits an upstream call, converting an elapsed deadline into `AuthError::Timeout`.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, what: &str, call: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(call = %what, timeout_ms = deadline.as_millis() as u64, "Upstream call timed out");
            Err(AuthError::Timeout(format!(
                "{} exceeded {}ms",
                what,
                deadline.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_grant_debug_redacts_tokens() {
        let grant = TokenGrant {
            access_token: "super-secret".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_in: 3600,
            granted_scopes: vec!["profile".to_string()],
        };

        let rendered = format!("{:?}", grant);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("also-secret"));
        assert!(rendered.contains("has_refresh_token: true"));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_result() {
        let ok = with_deadline(Duration::from_secs(1), "fast", async { Ok::<_, AuthError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), "failing", async {
            Err::<(), _>(AuthError::Upstream("boom".into()))
        })
        .await;
        assert_eq!(err, Err(AuthError::Upstream("boom".into())));
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result = with_deadline(Duration::from_millis(20), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AuthError>(())
        })
        .await;

        assert!(matches!(result, Err(AuthError::Timeout(_))));
    }
}
