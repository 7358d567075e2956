//! Notification handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::datetime::now_db;
use crate::notification::NotificationRepository;
use crate::web::dto::{ApiResponse, NotificationListResponse, NotificationQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<ApiResponse<NotificationListResponse>>, ApiError> {
    let mut conn = state.db.pool().acquire().await.map_err(crate::PostboxError::from)?;
    let notifications =
        NotificationRepository::list_for_user(&mut conn, claims.sub, query.unread).await?;
    let unread = NotificationRepository::count_unread(&mut conn, claims.sub).await?;

    Ok(Json(ApiResponse::new(NotificationListResponse {
        notifications: notifications.into_iter().map(Into::into).collect(),
        unread,
    })))
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.db.pool().acquire().await.map_err(crate::PostboxError::from)?;
    if !NotificationRepository::mark_read(&mut conn, claims.sub, id, &now_db()).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
