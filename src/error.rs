//! Error taxonomy for the authentication core.
//!
//! Every variant is reported to the immediate caller; none of them should
//! bring the process down. The type is `Clone` so a single renewal failure
//! can be handed to every caller waiting on it.

use std::fmt;

/// Errors raised by the crypto box, the pending/token stores and the
/// OAuth coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid client credentials or secret key. The OAuth
    /// feature reports itself disabled instead of failing hard.
    Configuration(String),
    /// State token missing, unknown, already used or expired.
    Csrf(String),
    /// Identity provider call failed or returned an unexpected shape.
    Upstream(String),
    /// An upstream call exceeded its deadline.
    Timeout(String),
    /// No credential on record for the owner, or it is no longer usable.
    NotAuthenticated,
    /// The credential has expired and carries no refresh token.
    NotRefreshable,
    /// Stored ciphertext could not be authenticated (tampering or key change).
    Integrity(String),
}

impl AuthError {
    /// True when the only way forward is a fresh authorization flow.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated
                | AuthError::NotRefreshable
                | AuthError::Integrity(_)
                | AuthError::Csrf(_)
        )
    }

    /// True for transient failures the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Upstream(_) | AuthError::Timeout(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            AuthError::Csrf(msg) => write!(f, "CSRF check failed: {}", msg),
            AuthError::Upstream(msg) => write!(f, "identity provider error: {}", msg),
            AuthError::Timeout(msg) => write!(f, "upstream call timed out: {}", msg),
            AuthError::NotAuthenticated => write!(f, "not authenticated"),
            AuthError::NotRefreshable => {
                write!(f, "credential expired and cannot be refreshed")
            }
            AuthError::Integrity(msg) => write!(f, "stored credential failed integrity check: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reauthentication_classification() {
        assert!(AuthError::NotAuthenticated.requires_reauthentication());
        assert!(AuthError::NotRefreshable.requires_reauthentication());
        assert!(AuthError::Integrity("bad tag".into()).requires_reauthentication());
        assert!(!AuthError::Upstream("502".into()).requires_reauthentication());
        assert!(!AuthError::Configuration("no key".into()).requires_reauthentication());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AuthError::Upstream("connection reset".into()).is_retryable());
        assert!(AuthError::Timeout("exchange".into()).is_retryable());
        assert!(!AuthError::Csrf("unknown state".into()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = AuthError::Csrf("unknown or expired state".into());
        assert_eq!(err.to_string(), "CSRF check failed: unknown or expired state");
        assert_eq!(AuthError::NotAuthenticated.to_string(), "not authenticated");
    }
}
