//! Profile and GDPR export handlers.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::db::{UserRepository, UserUpdate};
use crate::web::dto::{
    ApiResponse, ExportJobResponse, ProfileResponse, UpdateProfileRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// GET /api/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let user = UserRepository::new(state.db.pool())
        .get_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// PATCH /api/profile - Change the display name.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let update = UserUpdate::new().name(req.name.trim());
    let user = UserRepository::new(state.db.pool())
        .update(claims.sub, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// POST /api/profile/gdpr/export/request
///
/// 202 when a new job was queued, 200 when an existing one is returned.
pub async fn request_export(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<(StatusCode, Json<ExportJobResponse>), ApiError> {
    let (job, created) = state.exports.request(claims.sub).await?;
    let status = if created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ExportJobResponse {
            job: Some(state.exports.view(&job)),
        }),
    ))
}

/// GET /api/profile/gdpr/export/status
pub async fn export_status(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ExportJobResponse>, ApiError> {
    let job = state.exports.status(claims.sub).await?;
    Ok(Json(ExportJobResponse { job }))
}
