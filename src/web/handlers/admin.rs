//! Admin handlers.
//!
//! All routes require `role == "admin"` via [`AdminUser`]. Mail transitions go
//! through the same lifecycle table as the customer routes, with the admin
//! actor.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::UserRepository;
use crate::export::{cleanup_expired, CleanupReport};
use crate::mail::{Actor, MailItem};
use crate::web::dto::{
    AdminMailQuery, AdminUserResponse, ApiResponse, CreateMailItemRequest, MailItemResponse,
    PaginatedResponse, PaginationQuery, ShipRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AdminUser;

fn admin_view(state: &AppState, item: MailItem) -> MailItemResponse {
    let actions = state.mail().allowed_actions(&item, Actor::Admin);
    MailItemResponse::new(item, actions)
}

/// GET /api/admin/mail-items
pub async fn admin_list_mail_items(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Query(query): Query<AdminMailQuery>,
) -> Result<Json<ApiResponse<Vec<MailItemResponse>>>, ApiError> {
    let (offset, limit) = query.pagination().to_offset_limit();
    let items = state
        .mail()
        .list_all(query.status, query.include_deleted, offset, limit)
        .await?;
    Ok(Json(ApiResponse::new(
        items.into_iter().map(|i| admin_view(&state, i)).collect(),
    )))
}

/// POST /api/admin/mail-items - Log a newly received letter.
pub async fn admin_create_mail_item(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
    ValidatedJson(req): ValidatedJson<CreateMailItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MailItemResponse>>), ApiError> {
    let item = state
        .mail()
        .create_item(req.user_id, req.tag.as_deref())
        .await?;
    tracing::info!(admin_id = claims.sub, item_id = item.id, "Admin logged mail item");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(admin_view(&state, item))),
    ))
}

/// POST /api/admin/mail-items/:id/process
pub async fn admin_process_mail_item(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MailItemResponse>>, ApiError> {
    let item = state.mail().process(id).await?;
    Ok(Json(ApiResponse::new(admin_view(&state, item))))
}

/// POST /api/admin/mail-items/:id/ship
pub async fn admin_ship_mail_item(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<ShipRequest>,
) -> Result<Json<ApiResponse<MailItemResponse>>, ApiError> {
    let courier = req.courier.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let tracking = req
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let item = state.mail().ship(id, courier, tracking).await?;
    Ok(Json(ApiResponse::new(admin_view(&state, item))))
}

/// POST /api/admin/mail-items/:id/cancel
pub async fn admin_cancel_mail_item(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MailItemResponse>>, ApiError> {
    let item = state.mail().cancel(id).await?;
    Ok(Json(ApiResponse::new(admin_view(&state, item))))
}

/// DELETE /api/admin/mail-items/:id
pub async fn admin_delete_mail_item(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.mail().soft_delete(Actor::Admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/users
pub async fn admin_list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_claims): AdminUser,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<AdminUserResponse>>, ApiError> {
    let (offset, limit) = pagination.to_offset_limit();
    let repo = UserRepository::new(state.db.pool());
    let users = repo.list_all(offset, limit).await?;
    let total = repo.count().await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(Into::into).collect(),
        pagination.page.max(1),
        pagination.per_page.clamp(1, 200),
        u64::try_from(total).unwrap_or(0),
    )))
}

/// POST /api/admin/exports/cleanup - Run the expired export sweep now.
pub async fn admin_cleanup_exports(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
) -> Json<CleanupReport> {
    tracing::info!(admin_id = claims.sub, "Manual export cleanup requested");
    Json(cleanup_expired(&state.db, state.exports.settings(), &state.instance_id).await)
}
