//! Sumsub KYC review callbacks.

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::{info, warn};

use super::events::AppliedEvent;
use super::signature::{header_str, verify_hmac_hex};
use super::WebhookError;
use crate::config::WebhooksConfig;
use crate::db::{DbConn, KycStatus, UserRepository};
use crate::Result;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-payload-digest";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SumsubEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    applicant_id: Option<String>,
    #[serde(default)]
    external_user_id: Option<String>,
    #[serde(default)]
    review_status: Option<String>,
    #[serde(default)]
    review_result: Option<ReviewResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResult {
    #[serde(default)]
    review_answer: Option<String>,
}

pub(super) fn authorize(
    config: &WebhooksConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<(), WebhookError> {
    verify_hmac_hex(
        &config.sumsub_secret,
        body,
        header_str(headers, SIGNATURE_HEADER),
    )
}

pub(super) async fn apply(
    conn: &mut DbConn,
    payload: &serde_json::Value,
) -> Result<Vec<AppliedEvent>> {
    let event: SumsubEvent = super::parse_payload(payload)?;
    let user_id = event
        .external_user_id
        .as_deref()
        .and_then(|id| id.trim().parse::<i64>().ok());

    let update = match event.event_type.as_str() {
        "applicantReviewed" => {
            let answer = event
                .review_result
                .as_ref()
                .and_then(|r| r.review_answer.as_deref());
            let kyc = match answer {
                Some("GREEN") => Some(KycStatus::Verified),
                Some("RED") => Some(KycStatus::Rejected),
                _ => None,
            };
            let review = event.review_status.as_deref().unwrap_or("completed");
            Some((review.to_string(), kyc))
        }
        "applicantPending" => Some((
            event
                .review_status
                .clone()
                .unwrap_or_else(|| "pending".to_string()),
            Some(KycStatus::Pending),
        )),
        _ => None,
    };

    let mut matched = None;
    if let Some(id) = user_id {
        match update {
            Some((review, kyc)) => {
                if UserRepository::set_kyc_review(conn, id, &review, kyc).await? {
                    info!(user_id = id, review = %review, kyc = ?kyc.map(|k| k.as_str()), "KYC status updated");
                    matched = Some(id);
                } else {
                    warn!(user_id = id, "Sumsub event for unknown user");
                }
            }
            None => matched = UserRepository::resolve_id(conn, Some(id), None).await?,
        }
    }

    Ok(vec![AppliedEvent::new(event.event_type, payload.clone())
        .with_user(matched)
        .with_reference(event.applicant_id)])
}
