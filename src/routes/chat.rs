use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::models::{AppState, QueryRequest};
use crate::session::HistoryEntry;
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/{id}/queries", post(post_query))
        .route("/api/sessions/{id}/history", get(get_history))
        .with_state(state)
}

/// Dispatch one question. A failed answer is still a recorded entry, so
/// the response is the resolved entry either way.
pub async fn post_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<QueryRequest>,
) -> AppResult<Json<HistoryEntry>> {
    request.validate()?;
    let session = state.sessions.get(id).await?;
    let entry = session.dispatch_query(&request.query).await?;
    info!(session = %id, entry = entry.id, "Query resolved");
    Ok(Json(entry))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.history().await))
}
