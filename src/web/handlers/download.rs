//! Export archive download.
//!
//! The token in the path is the credential; no bearer token is required.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /api/downloads/export/:token
///
/// 404 for an unknown token or missing file, 410 once the link has expired.
pub async fn download_export(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.exports.resolve_download(&token).await?;

    let bytes = tokio::fs::read(&download.path).await.map_err(|e| {
        tracing::warn!(path = %download.path.display(), error = %e, "Export archive unreadable");
        ApiError::not_found("export file not found")
    })?;

    tracing::info!(file = %download.file_name, size = download.size, "Serving export archive");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    )
        .into_response())
}
