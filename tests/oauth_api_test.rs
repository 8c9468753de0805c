// Integration tests for the /api/auth endpoints and /health

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use jobscout::api::{create_router, AppState};
use jobscout::auth::SessionStore;
use jobscout::config::{OAuthConfig, SearchConfig};
use jobscout::credentials::{generate_key, CryptoBox, TokenStore};
use jobscout::dedup::InMemoryLedger;
use jobscout::error::AuthError;
use jobscout::matching::CandidateRecord;
use jobscout::oauth::{Identity, IdentityProvider, OAuthCoordinator, PendingAuthStore, TokenGrant};
use jobscout::search::{CandidateSource, SearchPipeline, SearchQuery};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn build_authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> String {
        format!(
            "https://id.example.com/authorize?client_id={}&redirect_uri={}&scope={}&state={}",
            client_id,
            urlencoding::encode(redirect_uri),
            scopes.join("+"),
            state
        )
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<TokenGrant, AuthError> {
        if code != "good-code" {
            return Err(AuthError::Upstream("invalid_grant".into()));
        }
        Ok(TokenGrant {
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_in: 3600,
            granted_scopes: vec!["profile".into()],
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
        Err(AuthError::Upstream("not scripted".into()))
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<Identity, AuthError> {
        let profile = json!({ "name": "Ada Lovelace" });
        Ok(Identity {
            owner_id: "member-1".into(),
            profile: profile.as_object().cloned().unwrap_or_default(),
        })
    }
}

struct EmptySource;

impl CandidateSource for EmptySource {
    fn fetch(&self, _query: &SearchQuery) -> BoxStream<'static, anyhow::Result<CandidateRecord>> {
        stream::empty().boxed()
    }

    fn name(&self) -> &str {
        "empty"
    }
}

fn create_test_app(with_credentials: bool) -> Router {
    let mut config = OAuthConfig::default();
    if with_credentials {
        config.client_id = Some("client-abc".into());
        config.client_secret = Some("secret-xyz".into());
    }
    config.redirect_uri = "http://localhost:8000/api/auth/callback".into();

    let provider: Arc<dyn IdentityProvider> = Arc::new(FakeProvider);
    let crypto = Arc::new(CryptoBox::new(&generate_key()).unwrap());
    let tokens = Arc::new(TokenStore::new(crypto, Arc::clone(&provider), Duration::from_secs(5)));
    let pending = PendingAuthStore::new(chrono::Duration::minutes(10));
    let coordinator = Arc::new(OAuthCoordinator::new(&config, pending, tokens, provider));

    let search = Arc::new(SearchPipeline::new(
        Arc::new(EmptySource),
        Arc::new(InMemoryLedger::new()),
        SearchConfig::default(),
    ));

    create_router(AppState {
        coordinator,
        search,
        sessions: SessionStore::new(chrono::Duration::hours(1)),
    })
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    send(app, "GET", uri, None).await
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Starts a flow and returns the state token embedded in the redirect.
async fn start_flow(app: &Router, uri: &str) -> String {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("https://id.example.com/authorize?client_id=client-abc"));
    location.split("state=").nth(1).unwrap().to_string()
}

/// Runs the whole flow and returns the issued session token.
async fn sign_in(app: &Router) -> String {
    let state = start_flow(app, "/api/auth/start").await;
    let response = get(app, &format!("/api/auth/callback?code=good-code&state={}", state)).await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["session_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_reports_services() {
    let app = create_test_app(true);
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["oauth"], "configured");
    assert_eq!(body["services"]["search"], "empty");
}

#[tokio::test]
async fn test_full_flow_then_logout() {
    let app = create_test_app(true);
    let state = start_flow(&app, "/api/auth/start?scope=profile").await;

    let response = get(&app, &format!("/api/auth/callback?code=good-code&state={}", state)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["owner_id"], "member-1");
    assert_eq!(body["profile"]["name"], "Ada Lovelace");
    let token = body["session_token"].as_str().unwrap().to_string();

    let response = send(&app, "GET", "/api/auth/member-1/status", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["state"], "authenticated");
    assert_eq!(body["refreshable"], true);

    let response = send(&app, "POST", "/api/auth/member-1/logout", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Logout ends the session along with the credentials
    let response = send(&app, "GET", "/api/auth/member-1/status", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = sign_in(&app).await;
    let body = json_body(send(&app, "GET", "/api/auth/member-1/status", Some(&token)).await).await;
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_owner_routes_require_session() {
    let app = create_test_app(true);
    sign_in(&app).await;

    let response = get(&app, "/api/auth/member-1/status").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Authorization token not provided");

    let response = send(&app, "POST", "/api/auth/member-1/logout", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, "POST", "/api/auth/member-1/logout", Some("forged")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Credentials survive the rejected logouts
    let token = sign_in(&app).await;
    let body = json_body(send(&app, "GET", "/api/auth/member-1/status", Some(&token)).await).await;
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_session_cannot_act_for_another_owner() {
    let app = create_test_app(true);
    let token = sign_in(&app).await;

    let response = send(&app, "GET", "/api/auth/member-2/status", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "POST", "/api/auth/member-2/logout", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_replayed_callback_rejected() {
    let app = create_test_app(true);
    let state = start_flow(&app, "/api/auth/start").await;
    let uri = format!("/api/auth/callback?code=good-code&state={}", state);

    assert_eq!(get(&app, &uri).await.status(), StatusCode::OK);
    assert_eq!(get(&app, &uri).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forged_state_rejected() {
    let app = create_test_app(true);
    start_flow(&app, "/api/auth/start").await;

    let response = get(&app, "/api/auth/callback?code=good-code&state=forged").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body.get("session_token").is_none());
}

#[tokio::test]
async fn test_missing_state_rejected() {
    let app = create_test_app(true);
    let response = get(&app, "/api/auth/callback?code=good-code").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_error_is_bad_request() {
    let app = create_test_app(true);
    let response = get(
        &app,
        "/api/auth/callback?error=access_denied&error_description=User+cancelled",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_failed_exchange_is_bad_gateway() {
    let app = create_test_app(true);
    let state = start_flow(&app, "/api/auth/start").await;

    let response = get(&app, &format!("/api/auth/callback?code=bad-code&state={}", state)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_disabled_without_credentials() {
    let app = create_test_app(false);

    let response = get(&app, "/api/auth/start").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(get(&app, "/health").await).await;
    assert_eq!(body["services"]["oauth"], "credentials_missing");

    // Owner routes still demand a session rather than failing as disabled
    let response = get(&app, "/api/auth/nobody/status").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
