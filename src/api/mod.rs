//! HTTP API.
//!
//! - `GET  /health`: service status
//! - `GET  /api/auth/start`: begin the OAuth flow (redirect)
//! - `GET  /api/auth/callback`: provider redirect target
//! - `GET  /api/auth/:owner/status`: credential status (bearer session)
//! - `POST /api/auth/:owner/logout`: revoke stored credentials (bearer session)
//! - `POST /api/search`: run a search
//! - `POST /api/search/async`: start a search in the background
//! - `GET  /api/search/status/:task_id`: background search state

mod oauth;
mod search;

use crate::auth::{SessionStore, TokenError};
use crate::error::AuthError;
use crate::oauth::OAuthCoordinator;
use crate::search::SearchPipeline;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Search request bodies are small JSON documents
const SEARCH_BODY_LIMIT: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OAuthCoordinator>,
    pub search: Arc<SearchPipeline>,
    pub sessions: SessionStore,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for API endpoints
#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Configuration(_) => AppError::ServiceUnavailable(message),
            AuthError::Csrf(_)
            | AuthError::NotAuthenticated
            | AuthError::NotRefreshable
            | AuthError::Integrity(_) => AppError::Unauthorized(message),
            AuthError::Upstream(_) => AppError::BadGateway(message),
            AuthError::Timeout(_) => AppError::GatewayTimeout(message),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: ServiceStatus,
}

#[derive(Serialize)]
struct ServiceStatus {
    oauth: &'static str,
    search: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/start", get(oauth::start))
        .route("/api/auth/callback", get(oauth::callback))
        .route("/api/auth/:owner_id/status", get(oauth::status))
        .route("/api/auth/:owner_id/logout", post(oauth::logout))
        .route(
            "/api/search",
            post(search::run).layer(DefaultBodyLimit::max(SEARCH_BODY_LIMIT)),
        )
        .route(
            "/api/search/async",
            post(search::submit).layer(DefaultBodyLimit::max(SEARCH_BODY_LIMIT)),
        )
        .route("/api/search/status/:task_id", get(search::task_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let oauth = if state.coordinator.is_enabled() {
        "configured"
    } else {
        "credentials_missing"
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        services: ServiceStatus {
            oauth,
            search: state.search.source_name().to_string(),
        },
    })
}
