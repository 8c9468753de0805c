//! OAuth 2.0 authorization code flow.
//!
//! Provides:
//! - CSRF-protected authorization requests (single-use state tokens)
//! - Code exchange and identity lookup through an [`IdentityProvider`]
//! - Lazy token refresh before authorized calls
//!
//! Flow:
//! 1. Client calls `GET /api/auth/start`
//! 2. Server generates state and redirects to the provider
//! 3. Provider redirects back to `GET /api/auth/callback?code=...&state=...`
//! 4. Server consumes the state, exchanges the code and stores encrypted tokens

mod coordinator;
mod http;
mod pending;
pub mod provider;

pub use coordinator::{AuthState, AuthStatus, AuthorizationRequest, CallbackOutcome, OAuthCoordinator};
pub use http::HttpIdentityProvider;
pub use pending::{run_pending_cleanup, PendingAuthStore, PendingAuthorization};
pub use provider::{Identity, IdentityProvider, TokenGrant};
