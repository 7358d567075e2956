//! Postmark bounce and spam complaint callbacks.

use axum::http::HeaderMap;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::{debug, info};

use super::events::AppliedEvent;
use super::signature::{verify_basic_auth, verify_ip_allowlist};
use super::WebhookError;
use crate::config::WebhooksConfig;
use crate::db::{DbConn, UserRepository};
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkEvent {
    #[serde(default)]
    record_type: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default, rename = "MessageID")]
    message_id: Option<String>,
}

/// Postmark signs nothing; it sends Basic credentials from a known set of addresses.
pub(super) fn authorize(
    config: &WebhooksConfig,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
) -> std::result::Result<(), WebhookError> {
    verify_ip_allowlist(
        &config.postmark_allowed_ips,
        &config.trusted_proxies,
        headers,
        peer,
    )?;
    verify_basic_auth(headers, &config.postmark_user, &config.postmark_pass)
}

pub(super) async fn apply(
    conn: &mut DbConn,
    payload: &serde_json::Value,
    now: &str,
) -> Result<Vec<AppliedEvent>> {
    let event: PostmarkEvent = super::parse_payload(payload)?;
    let record_type = event.record_type.unwrap_or_else(|| "Unknown".to_string());
    let address = event.email.or(event.recipient);

    let user_id = match (record_type.as_str(), address.as_deref()) {
        ("Bounce", Some(email)) => {
            let id = UserRepository::mark_email_bounced(conn, email, now).await?;
            info!(user_id = ?id, "Postmark bounce recorded");
            id
        }
        ("SpamComplaint", Some(email)) => {
            let id = UserRepository::mark_email_complaint(conn, email, now).await?;
            info!(user_id = ?id, "Postmark spam complaint recorded");
            id
        }
        (_, Some(email)) => UserRepository::resolve_id(conn, None, Some(email)).await?,
        (_, None) => None,
    };
    debug!(record_type = %record_type, "Postmark event applied");

    Ok(vec![AppliedEvent::new(record_type, payload.clone())
        .with_user(user_id)
        .with_reference(event.message_id)])
}
