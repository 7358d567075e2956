//! Integration tests for the GDPR export endpoints and archive downloads.

mod common;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;

use common::{bearer, create_test_app, TestApp};
use postbox::Role;

const REQUEST_PATH: &str = "/api/profile/gdpr/export/request";
const STATUS_PATH: &str = "/api/profile/gdpr/export/status";

async fn status(app: &TestApp, token: &str) -> Value {
    let response = app
        .server
        .get(STATUS_PATH)
        .add_header(AUTHORIZATION, bearer(token))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["job"].clone()
}

/// Poll until the background runner finishes the job.
async fn wait_for_done(app: &TestApp, token: &str) -> Value {
    for _ in 0..100 {
        let job = status(app, token).await;
        match job["status"].as_str() {
            Some("done") => return job,
            Some("error") => panic!("export failed: {}", job["error"]),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    panic!("export did not finish");
}

fn download_path(job: &Value) -> String {
    let url = job["download"].as_str().unwrap();
    let start = url.find("/api/downloads/export/").unwrap();
    url[start..].to_string()
}

#[tokio::test]
async fn test_status_without_job() {
    let app = create_test_app().await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    assert!(status(&app, &token).await.is_null());
}

#[tokio::test]
async fn test_request_then_reuse() {
    let app = create_test_app().await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    let first = app
        .server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    first.assert_status(StatusCode::ACCEPTED);
    let first_job = first.json::<Value>()["job"].clone();
    assert_eq!(first_job["type"], "gdpr");
    assert_eq!(first_job["status"], "pending");
    assert!(first_job["download"].is_null());

    let second = app
        .server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["job"]["id"], first_job["id"]);
}

#[tokio::test]
async fn test_completed_export_downloads() {
    let app = create_test_app().await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    app.server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let job = wait_for_done(&app, &token).await;
    assert!(job["fileSize"].as_i64().unwrap() > 0);
    assert!(job["download"]
        .as_str()
        .unwrap()
        .starts_with("http://postbox.test/api/downloads/export/"));

    // The token is the credential; no bearer header.
    let response = app.server.get(&download_path(&job)).await;
    response.assert_status_ok();
    assert_eq!(response.header(CONTENT_TYPE), "application/zip");
    assert!(response.as_bytes().starts_with(b"PK"));

    // A finished export inside the reuse window is returned as-is.
    let again = app
        .server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    again.assert_status_ok();
    assert_eq!(again.json::<Value>()["job"]["id"], job["id"]);
}

#[tokio::test]
async fn test_expired_link_is_gone() {
    let app = create_test_app().await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    app.server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::ACCEPTED);
    let job = wait_for_done(&app, &token).await;
    let path = download_path(&job);

    sqlx::query("UPDATE export_jobs SET expires_at = '2000-01-01 00:00:00' WHERE id = ?")
        .bind(job["id"].as_i64().unwrap())
        .execute(app.db.pool())
        .await
        .unwrap();

    app.server.get(&path).await.assert_status(StatusCode::GONE);
    assert!(status(&app, &token).await["download"].is_null());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let app = create_test_app().await;
    app.server
        .get("/api/downloads/export/deadbeef")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Cleanup
// ============================================================================

#[tokio::test]
async fn test_cleanup_purges_expired_archive() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    app.server
        .post(REQUEST_PATH)
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::ACCEPTED);
    let job = wait_for_done(&app, &token).await;

    sqlx::query("UPDATE export_jobs SET expires_at = '2000-01-01 00:00:00' WHERE id = ?")
        .bind(job["id"].as_i64().unwrap())
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app
        .server
        .post("/api/admin/exports/cleanup")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["cleaned"], 1);
    assert_eq!(report["lockedOut"], false);

    let exports_dir = app.data_dir.path().join("exports");
    let remaining = std::fs::read_dir(&exports_dir).unwrap().count();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_cleanup_locked_out() {
    let app = create_test_app().await;
    let (_, admin) = app.create_user("admin@example.com", Role::Admin).await;

    let guard = postbox::db::AdvisoryLock::new(postbox::db::EXPORT_CLEANUP_LOCK, "other-instance")
        .try_acquire(app.db.pool())
        .await
        .unwrap()
        .unwrap();

    let report: Value = app
        .server
        .post("/api/admin/exports/cleanup")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .json();
    assert_eq!(report["cleaned"], 0);
    assert_eq!(report["lockedOut"], true);

    guard.release().await.unwrap();
}

#[tokio::test]
async fn test_cleanup_requires_admin() {
    let app = create_test_app().await;
    let (_, token) = app.create_user("alice@example.com", Role::User).await;

    app.server
        .post("/api/admin/exports/cleanup")
        .add_header(AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}
