//! OneDrive scan arrival callbacks.

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use super::events::AppliedEvent;
use super::signature::{header_str, verify_hmac_hex};
use super::WebhookError;
use crate::config::WebhooksConfig;
use crate::db::{DbConn, UserRepository};
use crate::file::{FileRepository, NewFile, MAX_FILENAME_LENGTH};
use crate::mail::{Lifecycle, MailService};
use crate::Result;

/// Header carrying the hex HMAC-SHA256 of the body, optionally `sha256=`-prefixed.
pub const SIGNATURE_HEADER: &str = "x-onedrive-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanArrived {
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    user_email: Option<String>,
    item_id: String,
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    size: i64,
}

pub(super) fn authorize(
    config: &WebhooksConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<(), WebhookError> {
    verify_hmac_hex(
        &config.onedrive_secret,
        body,
        header_str(headers, SIGNATURE_HEADER),
    )
}

pub(super) async fn apply(
    conn: &mut DbConn,
    lifecycle: &Lifecycle,
    payload: &serde_json::Value,
    now: &str,
) -> Result<Vec<AppliedEvent>> {
    let scan: ScanArrived = super::parse_payload(payload)?;

    let Some(user_id) =
        UserRepository::resolve_id(conn, scan.user_id, scan.user_email.as_deref()).await?
    else {
        warn!(item_id = %scan.item_id, "Scan for unknown user");
        return Ok(vec![AppliedEvent::new("file.unmatched", payload.clone())
            .with_reference(Some(scan.item_id))]);
    };

    let name: String = scan.name.chars().take(MAX_FILENAME_LENGTH).collect();
    let file = FileRepository::upsert(
        conn,
        &NewFile {
            user_id,
            item_id: scan.item_id.clone(),
            name,
            path: scan.path,
            web_url: scan.web_url,
            size: scan.size,
        },
        now,
    )
    .await?;
    let Some(item) = MailService::ingest_scan(conn, lifecycle, file.user_id, file.id).await?
    else {
        warn!(item_id = %scan.item_id, file_id = file.id, "Scan for deleted mail item");
        return Ok(vec![AppliedEvent::new("file.ignored", payload.clone())
            .with_user(Some(file.user_id))
            .with_reference(Some(scan.item_id))
            .ignored()]);
    };

    let mut event = AppliedEvent::new("file.created", payload.clone())
        .with_user(Some(file.user_id))
        .with_reference(Some(scan.item_id));
    if let serde_json::Value::Object(ref mut map) = event.payload {
        map.insert("mailItemId".to_string(), item.id.into());
    }
    Ok(vec![event])
}
