//! Router configuration for the web API.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    admin_cancel_mail_item, admin_cleanup_exports, admin_create_mail_item,
    admin_delete_mail_item, admin_list_mail_items, admin_list_users, admin_process_mail_item,
    admin_ship_mail_item, delete_mail_item, download_export, export_status, forward_mail_item,
    get_mail_item, get_profile, gocardless_webhook, list_forwarding_requests, list_mail_items,
    list_notifications, mark_notification_read, onedrive_webhook, postmark_webhook,
    request_export, sumsub_webhook, update_mail_item, update_profile, AppState,
};
use super::middleware::{create_cors_layer, jwt_auth, JwtState};

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: &[String],
) -> Router {
    let mail_routes = Router::new()
        .route("/", get(list_mail_items))
        .route(
            "/:id",
            get(get_mail_item)
                .patch(update_mail_item)
                .delete(delete_mail_item),
        )
        .route("/:id/forward", post(forward_mail_item));

    let profile_routes = Router::new()
        .route("/", get(get_profile).patch(update_profile))
        .route("/gdpr/export/request", post(request_export))
        .route("/gdpr/export/status", get(export_status));

    let notification_routes = Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_notification_read));

    let admin_routes = Router::new()
        .route(
            "/mail-items",
            get(admin_list_mail_items).post(admin_create_mail_item),
        )
        .route("/mail-items/:id", delete(admin_delete_mail_item))
        .route("/mail-items/:id/process", post(admin_process_mail_item))
        .route("/mail-items/:id/ship", post(admin_ship_mail_item))
        .route("/mail-items/:id/cancel", post(admin_cancel_mail_item))
        .route("/users", get(admin_list_users))
        .route("/exports/cleanup", post(admin_cleanup_exports));

    // Authenticated by provider credentials, not JWT.
    let webhook_routes = Router::new()
        .route("/postmark", post(postmark_webhook))
        .route("/sumsub", post(sumsub_webhook))
        .route("/gc", post(gocardless_webhook))
        .route("/onedrive", post(onedrive_webhook));

    let api_routes = Router::new()
        .nest("/mail-items", mail_routes)
        .route("/forwarding-requests", get(list_forwarding_requests))
        .nest("/profile", profile_routes)
        .nest("/notifications", notification_routes)
        .nest("/admin", admin_routes)
        .nest("/webhooks", webhook_routes)
        .route("/downloads/export/:token", get(download_export));

    let jwt_state_for_middleware = jwt_state.clone();

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let state = jwt_state_for_middleware.clone();
                    jwt_auth(state, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_router() {
        let response = create_health_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }
}
