use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::models::{AppState, UploadResponse};
use crate::types::{AppError, AppResult};

// multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let limit = state.config.session.upload_max_bytes;
    Router::new()
        .route("/api/sessions/{id}/dataset", post(upload_dataset))
        .layer(DefaultBodyLimit::max(limit + MULTIPART_OVERHEAD))
        .with_state(state)
}

/// POST /api/sessions/{id}/dataset - multipart field `file`
async fn upload_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let session = state.sessions.get(id).await?;
    let limit = state.config.session.upload_max_bytes;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::InvalidRequest("missing multipart field 'file'".to_string()))?;
    if data.len() > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "{} is {} bytes, the limit is {}",
            filename,
            data.len(),
            limit
        )));
    }
    info!(session = %id, filename = %filename, size = data.len(), "Dataset upload received");

    let (dataset, agent) = session
        .load_dataset(filename, data, state.auto_init_factory())
        .await?;
    Ok(Json(UploadResponse { dataset, agent }))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidRequest(err.body_text())
    }
}
