//! API session tokens.
//!
//! A successful OAuth callback issues an opaque session token bound to the
//! owner it authenticated. Owner-scoped endpoints require that token as
//! `Authorization: Bearer <token>`.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

/// Random bytes per session token (256 bits)
const SESSION_BYTES: usize = 32;

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(TokenError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction and session lookup errors
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    /// Token is empty string
    Empty,
    /// Unknown or expired session
    Unknown,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
            TokenError::Unknown => write!(f, "Unknown or expired session"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Clone, Debug)]
struct Session {
    owner_id: String,
    expires_at: DateTime<Utc>,
}

/// Issued session tokens, keyed by token.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh token for `owner_id`. Expired sessions are swept first.
    pub fn issue(&self, owner_id: &str) -> String {
        self.cleanup_expired();

        let mut bytes = [0u8; SESSION_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.sessions.insert(
            token.clone(),
            Session {
                owner_id: owner_id.to_string(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        debug!(owner_id = %owner_id, "Session issued");
        token
    }

    /// Owner bound to `token`, if the session is live.
    pub fn owner_of(&self, token: &str) -> Result<String, TokenError> {
        let session = self
            .sessions
            .get(token)
            .map(|s| s.clone())
            .ok_or(TokenError::Unknown)?;

        if Utc::now() >= session.expires_at {
            self.sessions.remove(token);
            return Err(TokenError::Unknown);
        }
        Ok(session.owner_id)
    }

    /// Resolves the bearer token in `headers` to its owner.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<String, TokenError> {
        let token = extract_bearer_token(headers)?;
        self.owner_of(&token)
    }

    /// Drops every session of `owner_id`. Returns how many were dropped.
    pub fn revoke_owner(&self, owner_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.owner_id != owner_id);
        before.saturating_sub(self.sessions.len())
    }

    pub fn cleanup_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Utc::now();
        self.sessions.retain(|_, s| now < s.expires_at);
        before.saturating_sub(self.sessions.len())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
