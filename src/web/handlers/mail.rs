//! Customer mail item handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::mail::ForwardAddress;
use crate::web::dto::{
    ApiResponse, ForwardRequest, ForwardResponse, ForwardingRequestResponse, MailItemResponse,
    UpdateTagRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// GET /api/mail-items - The caller's visible mail items.
pub async fn list_mail_items(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<MailItemResponse>>>, ApiError> {
    let service = state.mail();
    let items = service.list_for_user(claims.sub).await?;

    let data = items
        .into_iter()
        .map(|item| {
            let actions = service.allowed_actions(&item, claims.actor());
            MailItemResponse::new(item, actions)
        })
        .collect();
    Ok(Json(ApiResponse::new(data)))
}

/// GET /api/mail-items/:id
pub async fn get_mail_item(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MailItemResponse>>, ApiError> {
    let service = state.mail();
    let item = service.get_for_user(claims.sub, id).await?;
    let actions = service.allowed_actions(&item, claims.actor());
    Ok(Json(ApiResponse::new(MailItemResponse::new(item, actions))))
}

/// PATCH /api/mail-items/:id - Set or clear the tag.
pub async fn update_mail_item(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateTagRequest>,
) -> Result<Json<ApiResponse<MailItemResponse>>, ApiError> {
    let service = state.mail();
    let item = service
        .update_tag(claims.sub, id, req.tag.as_deref())
        .await?;
    let actions = service.allowed_actions(&item, claims.actor());
    Ok(Json(ApiResponse::new(MailItemResponse::new(item, actions))))
}

/// DELETE /api/mail-items/:id - Soft delete.
pub async fn delete_mail_item(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.mail().soft_delete(claims.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/mail-items/:id/forward
pub async fn forward_mail_item(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<ForwardRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ForwardResponse>>), ApiError> {
    let service = state.mail();
    let address = ForwardAddress::from(req.address);
    let (item, request) = service
        .request_forward(claims.sub, id, &address, req.note.as_deref())
        .await?;

    let actions = service.allowed_actions(&item, claims.actor());
    let body = ForwardResponse {
        item: MailItemResponse::new(item, actions),
        forwarding_request: request.into(),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::new(body))))
}

/// GET /api/forwarding-requests
pub async fn list_forwarding_requests(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<ForwardingRequestResponse>>>, ApiError> {
    let requests = state.mail().list_forwarding_requests(claims.sub).await?;
    Ok(Json(ApiResponse::new(
        requests.into_iter().map(Into::into).collect(),
    )))
}
