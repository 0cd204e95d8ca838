use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::dataset::RowsPage;
use crate::models::{ApiKeyRequest, AppState, InitializeAgentRequest, RowsQuery};
use crate::session::{AgentStatus, SessionSummary};
use crate::types::{AppResult, ApiKey};

const DEFAULT_PAGE_ROWS: usize = 100;
const MAX_PAGE_ROWS: usize = 1000;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/api-key", put(set_api_key))
        .route("/api/sessions/{id}/agent", post(initialize_agent))
        .route("/api/sessions/{id}/dataset/rows", get(get_rows))
        .with_state(state)
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionSummary>) {
    let session = state
        .sessions
        .create(state.config.llm.fallback_api_key.clone(), state.default_agent_config())
        .await;
    (StatusCode::CREATED, Json(session.summary().await))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSummary>> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.summary().await))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.sessions.remove(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn set_api_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApiKeyRequest>,
) -> AppResult<Json<AgentStatus>> {
    let session = state.sessions.get(id).await?;
    let status = session
        .set_api_key(ApiKey::new(request.api_key), state.auto_init_factory())
        .await;
    Ok(Json(status))
}

async fn initialize_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<InitializeAgentRequest>,
) -> AppResult<Json<AgentStatus>> {
    request.validate()?;
    let session = state.sessions.get(id).await?;

    let mut config = session.summary().await.agent_config;
    if let Some(model) = request.model {
        config.model = model;
    }
    if let Some(temperature) = request.temperature {
        config.temperature = temperature;
    }
    if let Some(verbose) = request.verbose {
        config.verbose = verbose;
    }
    info!(session = %id, model = %config.model, temperature = config.temperature, "Initializing agent");

    let status = session
        .initialize_agent(state.agent_factory.as_ref(), Some(config))
        .await?;
    Ok(Json(status))
}

async fn get_rows(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<RowsQuery>,
) -> AppResult<Json<RowsPage>> {
    let session = state.sessions.get(id).await?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_ROWS).min(MAX_PAGE_ROWS);
    Ok(Json(session.rows(params.offset.unwrap_or(0), limit).await?))
}
