//! OAuth 2.0 identity provider over HTTP.
//!
//! Speaks the standard authorization-code and refresh-token grants and
//! resolves the owner through the provider's userinfo endpoint.

use super::provider::{Identity, IdentityProvider, TokenGrant, MAX_TOKEN_TTL_SECONDS};
use crate::config::OAuthConfig;
use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> Result<TokenGrant, AuthError> {
        // The record's expiry must come from the provider, never from a local guess
        let expires_in = self.expires_in.ok_or_else(|| {
            AuthError::Upstream("token response is missing expires_in".to_string())
        })?;
        if expires_in <= 0 || expires_in > MAX_TOKEN_TTL_SECONDS {
            return Err(AuthError::Upstream(format!(
                "token response has out-of-range expires_in {}",
                expires_in
            )));
        }

        Ok(TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in,
            granted_scopes: self.scope.as_deref().map(split_scopes).unwrap_or_default(),
        })
    }
}

/// Scopes come back space-separated per RFC 6749, some providers use commas.
fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ' ' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Identity provider backed by real OAuth endpoints.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    authorization_url: String,
    token_url: String,
    userinfo_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpIdentityProvider {
    pub fn new(
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            userinfo_url: userinfo_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Builds a provider from the `[oauth]` section.
    ///
    /// Missing client credentials leave the fields blank; the coordinator
    /// refuses to start a flow in that case.
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(
            &config.authorization_url,
            &config.token_url,
            &config.userinfo_url,
            config.client_id.clone().unwrap_or_default(),
            config.client_secret.clone().unwrap_or_default(),
        )
    }

    async fn post_token_form(&self, form: &HashMap<&str, &str>, what: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to send {} request: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(AuthError::Upstream(format!(
                "{} failed with status {}: {}",
                what, status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to parse {} response: {}", what, e)))?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "{} successful",
            what
        );

        token_response.into_grant()
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn build_authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> String {
        let scopes = scopes.join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.authorization_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", redirect_uri);
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());

        debug!(token_url = %self.token_url, "Exchanging authorization code for token");
        self.post_token_form(&form, "token exchange").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());

        self.post_token_form(&form, "token refresh").await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to send profile request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Upstream(format!(
                "profile fetch failed with status {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("failed to parse profile response: {}", e)))?;

        identity_from_profile(body)
    }
}

/// Extracts the canonical owner id (`sub`, falling back to `id`) from a profile document.
fn identity_from_profile(body: Value) -> Result<Identity, AuthError> {
    let Value::Object(mut profile) = body else {
        return Err(AuthError::Upstream("profile response is not a JSON object".to_string()));
    };

    let owner_id = ["sub", "id"]
        .iter()
        .find_map(|field| match profile.remove(*field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| AuthError::Upstream("profile response has no subject identifier".to_string()))?;

    Ok(Identity { owner_id, profile })
}
