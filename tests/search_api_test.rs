// Integration tests for POST /api/search

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use jobscout::api::{create_router, AppState};
use jobscout::auth::SessionStore;
use jobscout::config::{OAuthConfig, SearchConfig};
use jobscout::credentials::{CryptoBox, TokenStore};
use jobscout::dedup::{InMemoryLedger, SqliteLedger};
use jobscout::matching::CandidateRecord;
use jobscout::oauth::{HttpIdentityProvider, IdentityProvider, OAuthCoordinator, PendingAuthStore};
use jobscout::search::{CandidateSource, JsonFileSource, SearchPipeline, SearchQuery};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

/// Replays the same candidates on every fetch.
struct FixtureSource {
    candidates: Vec<CandidateRecord>,
}

impl CandidateSource for FixtureSource {
    fn fetch(&self, query: &SearchQuery) -> BoxStream<'static, anyhow::Result<CandidateRecord>> {
        let items: Vec<_> = self
            .candidates
            .iter()
            .take(query.max_results)
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(items).boxed()
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

fn candidate(id: &str, title: &str, description: &str, link: &str) -> CandidateRecord {
    CandidateRecord {
        id: id.to_string(),
        title: title.to_string(),
        organization: "Acme".to_string(),
        location: "Remote".to_string(),
        description: description.to_string(),
        posted_at: None,
        source_link: link.to_string(),
    }
}

fn fixtures() -> Vec<CandidateRecord> {
    vec![
        candidate("1", "Backend Engineer", "Seeking a Django expert with Python skills", "https://jobs.example.com/1"),
        candidate("2", "Data Engineer", "Python pipelines", "https://jobs.example.com/2"),
        candidate("3", "Frontend Engineer", "React and TypeScript", "https://jobs.example.com/3"),
        // Same posting seen under a second id
        candidate("4", "Backend Engineer", "Seeking a Django expert with Python skills", "https://jobs.example.com/1"),
    ]
}

fn create_test_app(
    source: Arc<dyn CandidateSource>,
    ledger: Arc<dyn jobscout::dedup::ResultLedger>,
) -> Router {
    let oauth = OAuthConfig::default();
    let provider: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::from_config(&oauth));
    let tokens = Arc::new(TokenStore::new(
        Arc::new(CryptoBox::disabled()),
        Arc::clone(&provider),
        Duration::from_secs(5),
    ));
    let coordinator = Arc::new(OAuthCoordinator::new(
        &oauth,
        PendingAuthStore::new(chrono::Duration::minutes(10)),
        tokens,
        provider,
    ));
    let search = Arc::new(SearchPipeline::new(source, ledger, SearchConfig::default()));

    create_router(AppState {
        coordinator,
        search,
        sessions: SessionStore::new(chrono::Duration::hours(1)),
    })
}

async fn search(app: &Router, body: Value) -> (StatusCode, Value) {
    call(app, "POST", "/api/search", Some(body)).await
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn result_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["candidate"]["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_search_scores_dedups_and_ranks() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = search(
        &app,
        json!({ "keywords": "engineer", "requirements": ["python", "django"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fetched"], 4);
    assert_eq!(body["matched"], 3);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(body["timed_out"], false);
    assert!(body.get("source_error").is_none());
    assert_eq!(result_ids(&body), vec!["1", "2"]);

    let first = &body["results"][0];
    assert_eq!(first["score"], 2);
    assert_eq!(first["matched_keywords"], json!(["python", "django"]));
    assert_eq!(first["is_match"], true);
}

#[tokio::test]
async fn test_second_search_sees_ledger() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );
    let request = json!({ "requirements": ["python"] });

    let (_, first) = search(&app, request.clone()).await;
    assert_eq!(result_ids(&first), vec!["1", "2"]);

    let (_, second) = search(&app, request).await;
    assert!(result_ids(&second).is_empty());
    assert_eq!(second["duplicates"], 3);

    // Opting out of filtering returns everything again
    let (_, third) = search(&app, json!({ "requirements": ["python"], "filter_duplicates": false })).await;
    assert_eq!(result_ids(&third), vec!["1", "2", "4"]);
}

#[tokio::test]
async fn test_empty_requirements_match_everything() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = search(&app, json!({ "filter_duplicates": false, "max_jobs": 2 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fetched"], 2);
    assert_eq!(result_ids(&body), vec!["1", "2"]);
}

#[tokio::test]
async fn test_json_file_source_with_sqlite_ledger() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&fixtures()).unwrap().as_bytes())
        .unwrap();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.db");

    let request = json!({ "keywords": "backend", "requirements": ["django"] });

    {
        let app = create_test_app(
            Arc::new(JsonFileSource::new(file.path())),
            Arc::new(SqliteLedger::open(&db_path).unwrap()),
        );
        let (status, body) = search(&app, request.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result_ids(&body), vec!["1"]);
    }

    // A fresh process with the same ledger file remembers the key
    let app = create_test_app(
        Arc::new(JsonFileSource::new(file.path())),
        Arc::new(SqliteLedger::open(&db_path).unwrap()),
    );
    let (_, body) = search(&app, request).await;
    assert!(result_ids(&body).is_empty());
    assert_eq!(body["duplicates"], 2);
}

#[tokio::test]
async fn test_missing_candidate_file_reported() {
    let app = create_test_app(
        Arc::new(JsonFileSource::new("/nonexistent/candidates.json")),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = search(&app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fetched"], 0);
    assert!(body["source_error"].as_str().unwrap().contains("candidates.json"));
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, _) = search(&app, json!({ "requirements": "python" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_date_posted_narrows_file_source() {
    let mut fresh = candidate("fresh", "Engineer", "python", "https://jobs.example.com/fresh");
    fresh.posted_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
    let mut stale = candidate("stale", "Engineer", "python", "https://jobs.example.com/stale");
    stale.posted_at = Some(chrono::Utc::now() - chrono::Duration::days(60));

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&vec![fresh, stale]).unwrap().as_bytes())
        .unwrap();
    let app = create_test_app(
        Arc::new(JsonFileSource::new(file.path())),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = search(
        &app,
        json!({
            "date_posted": "past week",
            "experience_level": "mid",
            "employment_type": "full-time",
            "filter_duplicates": false
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&body), vec!["fresh"]);

    let (status, _) = search(&app, json!({ "date_posted": "last century" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_async_search_reports_status() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = call(
        &app,
        "POST",
        "/api/search/async",
        Some(json!({ "requirements": ["python"] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "running");
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let status_url = body["status_url"].as_str().unwrap().to_string();
    assert_eq!(status_url, format!("/api/search/status/{}", task_id));

    let mut task = Value::Null;
    for _ in 0..100 {
        let (status, body) = call(&app, "GET", &status_url, None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            task = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(task["status"], "completed");
    assert_eq!(task["request"]["requirements"], json!(["python"]));
    assert_eq!(result_ids(&task["result"]), vec!["1", "2"]);
}

#[tokio::test]
async fn test_unknown_task_not_found() {
    let app = create_test_app(
        Arc::new(FixtureSource { candidates: fixtures() }),
        Arc::new(InMemoryLedger::new()),
    );

    let (status, body) = call(
        &app,
        "GET",
        "/api/search/status/01890a5d-ac96-774b-bcce-b302099a8057",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = call(&app, "GET", "/api/search/status/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
