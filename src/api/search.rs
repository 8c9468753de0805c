//! Search endpoints.

use super::{AppError, AppState};
use crate::search::{SearchOutcome, SearchRequest, SearchTask, TaskStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Response for `POST /api/search/async`
#[derive(Debug, Serialize)]
pub(super) struct SubmittedSearch {
    task_id: Uuid,
    status: TaskStatus,
    message: &'static str,
    status_url: String,
}

/// POST /api/search
pub(super) async fn run(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchOutcome> {
    Json(state.search.run(request).await)
}

/// POST /api/search/async
pub(super) async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> (StatusCode, Json<SubmittedSearch>) {
    let task = state.search.submit(request);

    (
        StatusCode::ACCEPTED,
        Json(SubmittedSearch {
            task_id: task.task_id,
            status: task.status,
            message: "Search started in background",
            status_url: format!("/api/search/status/{}", task.task_id),
        }),
    )
}

/// GET /api/search/status/:task_id
pub(super) async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<SearchTask>, AppError> {
    state
        .search
        .task(task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Search task {} not found", task_id)))
}
