//! Integration tests for the mail item and forwarding endpoints.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{bearer, create_test_app, TestApp};
use postbox::Role;

fn address() -> Value {
    json!({
        "name": "Ada Lovelace",
        "line1": "12 St James's Square",
        "city": "London",
        "postcode": "SW1Y 4JH",
        "country": "GB"
    })
}

/// Log a letter for `user_id` as admin and return its id.
async fn log_item(app: &TestApp, admin_token: &str, user_id: i64) -> i64 {
    let response = app
        .server
        .post("/api/admin/mail-items")
        .add_header(AUTHORIZATION, bearer(admin_token))
        .json(&json!({ "user_id": user_id, "tag": "bank" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["data"]["id"].as_i64().unwrap()
}

async fn process_item(app: &TestApp, admin_token: &str, id: i64) {
    app.server
        .post(&format!("/api/admin/mail-items/{}/process", id))
        .add_header(AUTHORIZATION, bearer(admin_token))
        .await
        .assert_status_ok();
}

fn reason(body: &Value) -> &str {
    body["error"]["details"]["reason"].as_str().unwrap_or_default()
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_requires_auth() {
    let app = create_test_app().await;
    app.server
        .get("/api/mail-items")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_only_own_items() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, alice_token) = app.create_user("alice@example.com", Role::User).await;
    let (bob, _) = app.create_user("bob@example.com", Role::User).await;

    log_item(&app, &admin, alice.id).await;
    log_item(&app, &admin, bob.id).await;

    let response = app
        .server
        .get("/api/mail-items")
        .add_header(AUTHORIZATION, bearer(&alice_token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["user_id"], alice.id);
    assert_eq!(items[0]["status"], "received");
}

#[tokio::test]
async fn test_update_tag() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;

    let response = app
        .server
        .patch(&format!("/api/mail-items/{}", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "tag": "tax" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["tag"], "tax");
}

// ============================================================================
// Forwarding
// ============================================================================

#[tokio::test]
async fn test_forward_processed_item() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    let response = app
        .server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": address(), "note": "fragile" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["data"]["item"]["status"], "forward_requested");
    assert_eq!(body["data"]["item"]["forwarding_status"], "requested");
    assert!(body["data"]["item"]["storage_expires_at"].is_string());

    let requests: Value = app
        .server
        .get("/api/forwarding-requests")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(requests["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_forward_received_item_is_invalid_state() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;

    let response = app
        .server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": address() }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(reason(&response.json()), "invalid_state");
}

#[tokio::test]
async fn test_forward_someone_elses_item() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, _) = app.create_user("alice@example.com", Role::User).await;
    let (_, bob_token) = app.create_user("bob@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    let response = app
        .server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&bob_token))
        .json(&json!({ "address": address() }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(reason(&response.json()), "not_owner");
}

#[tokio::test]
async fn test_forward_after_window_is_too_old() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    sqlx::query("UPDATE mail_items SET created_at = ? WHERE id = ?")
        .bind(postbox::datetime::db_offset_from_now(chrono::Duration::days(-30)))
        .bind(id)
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app
        .server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": address() }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(reason(&response.json()), "too_old");
}

#[tokio::test]
async fn test_forward_deleted_item() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    app.server
        .delete(&format!("/api/mail-items/{}", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = app
        .server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": address() }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(reason(&response.json()), "deleted");
}

#[tokio::test]
async fn test_forward_rejects_blank_address() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    let mut addr = address();
    addr["line1"] = json!("   ");
    app.server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": addr }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Admin flow
// ============================================================================

#[tokio::test]
async fn test_ship_notifies_owner() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;
    process_item(&app, &admin, id).await;

    app.server
        .post(&format!("/api/mail-items/{}/forward", id))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "address": address() }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app
        .server
        .post(&format!("/api/admin/mail-items/{}/ship", id))
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&json!({ "courier": "Royal Mail", "tracking_number": "RM123" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "forwarded");
    assert_eq!(body["data"]["forwarding_status"], "dispatched");

    let notifications: Value = app
        .server
        .get("/api/notifications")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .json();
    let kinds: Vec<&str> = notifications["data"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"mail_forwarded"));
    assert!(notifications["data"]["unread"].as_i64().unwrap() >= 1);
}

#[tokio::test]
async fn test_cancel_forwarded_item_is_rejected() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (alice, _) = app.create_user("alice@example.com", Role::User).await;
    let id = log_item(&app, &admin, alice.id).await;

    app.server
        .post(&format!("/api/admin/mail-items/{}/cancel", id))
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status_ok();

    let response = app
        .server
        .post(&format!("/api/admin/mail-items/{}/cancel", id))
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(reason(&response.json()), "invalid_state");
}

#[tokio::test]
async fn test_admin_routes_reject_customers() {
    let app = create_test_app().await;
    let (alice, token) = app.create_user("alice@example.com", Role::User).await;

    app.server
        .post("/api/admin/mail-items")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "user_id": alice.id }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get("/api/admin/users")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;

    app.server
        .post("/api/admin/mail-items/9999/process")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
