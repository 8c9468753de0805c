//! OAuth endpoints.

use super::{AppError, AppState};
use crate::oauth::{AuthStatus, CallbackOutcome};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Redirect},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Query for `GET /api/auth/start`
#[derive(Debug, Default, Deserialize)]
pub(super) struct StartQuery {
    /// Comma- or space-separated scopes; configured defaults when absent
    scope: Option<String>,
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub(super) struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Callback response: the outcome plus the session token that unlocks the
/// owner's status and logout endpoints.
#[derive(Debug, Serialize)]
pub(super) struct CallbackResponse {
    #[serde(flatten)]
    outcome: CallbackOutcome,
    session_token: String,
}

/// GET /api/auth/start
///
/// Redirects the user to the provider's authorization page with a fresh
/// single-use state token.
pub(super) async fn start(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Redirect, AppError> {
    let scopes: Vec<String> = query
        .scope
        .as_deref()
        .unwrap_or_default()
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let request = state.coordinator.initiate(&scopes)?;

    info!(expires_at = %request.expires_at, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&request.url))
}

/// GET /api/auth/callback
///
/// Provider redirect target. Validates the state, exchanges the code,
/// stores encrypted credentials and issues a session token for the owner.
pub(super) async fn callback(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let csrf_state = callback.state.ok_or_else(|| {
        warn!("OAuth callback without state");
        AppError::Unauthorized("Missing 'state' parameter".to_string())
    })?;
    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;

    debug!(state = %csrf_state, "OAuth callback received");

    let outcome = state.coordinator.handle_callback(&code, &csrf_state).await?;
    let session_token = state.sessions.issue(&outcome.owner_id);
    Ok(Json(CallbackResponse {
        outcome,
        session_token,
    }))
}

/// Requires a live session belonging to `owner_id`.
fn authorize_owner(state: &AppState, headers: &HeaderMap, owner_id: &str) -> Result<(), AppError> {
    let session_owner = state.sessions.authenticate(headers).map_err(|e| {
        debug!(owner_id = %owner_id, error = %e, "Rejected owner request");
        AppError::from(e)
    })?;

    if session_owner != owner_id {
        warn!(owner_id = %owner_id, session_owner = %session_owner, "Session used for another owner");
        return Err(AppError::Forbidden(
            "Session does not belong to this owner".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/auth/:owner_id/status
pub(super) async fn status(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AuthStatus>, AppError> {
    authorize_owner(&state, &headers, &owner_id)?;
    Ok(Json(state.coordinator.status(&owner_id)))
}

/// POST /api/auth/:owner_id/logout
///
/// Revokes stored credentials and every session of the owner.
pub(super) async fn logout(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    authorize_owner(&state, &headers, &owner_id)?;
    state.coordinator.logout(&owner_id);
    let sessions = state.sessions.revoke_owner(&owner_id);
    info!(owner_id = %owner_id, sessions, "Owner logged out");
    Ok(StatusCode::NO_CONTENT)
}
