//! GoCardless mandate and payment callbacks.
//!
//! One delivery carries a batch of events; each is applied and logged
//! separately inside the same transaction.

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::{debug, info};

use super::events::AppliedEvent;
use super::signature::{header_str, verify_hmac_hex};
use super::WebhookError;
use crate::billing::{InvoiceRepository, InvoiceStatus};
use crate::config::WebhooksConfig;
use crate::db::{DbConn, PlanStatus, UserRepository};
use crate::Result;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "webhook-signature";

#[derive(Debug, Deserialize)]
struct GcPayload {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GcEvent {
    #[serde(default)]
    id: Option<String>,
    resource_type: String,
    action: String,
    #[serde(default)]
    links: GcLinks,
}

#[derive(Debug, Default, Deserialize)]
struct GcLinks {
    #[serde(default)]
    mandate: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    payment: Option<String>,
}

pub(super) fn authorize(
    config: &WebhooksConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<(), WebhookError> {
    verify_hmac_hex(
        &config.gocardless_secret,
        body,
        header_str(headers, SIGNATURE_HEADER),
    )
}

pub(super) async fn apply(
    conn: &mut DbConn,
    payload: &serde_json::Value,
) -> Result<Vec<AppliedEvent>> {
    let batch: GcPayload = super::parse_payload(payload)?;
    let mut applied = Vec::with_capacity(batch.events.len());

    for raw in batch.events {
        let event: GcEvent = match serde_json::from_value(raw.clone()) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "Skipping malformed GoCardless event");
                continue;
            }
        };
        let user_id = apply_one(conn, &event).await?;
        applied.push(
            AppliedEvent::new(format!("{}.{}", event.resource_type, event.action), raw)
                .with_user(user_id)
                .with_reference(event.id),
        );
    }

    Ok(applied)
}

async fn apply_one(conn: &mut DbConn, event: &GcEvent) -> Result<Option<i64>> {
    match (event.resource_type.as_str(), event.action.as_str()) {
        ("mandates", "created" | "active" | "reinstated") => {
            let Some(mandate) = event.links.mandate.as_deref() else {
                return Ok(None);
            };
            let user_id = mandate_owner(conn, &event.links).await?;
            if let Some(id) = user_id {
                UserRepository::set_mandate(conn, id, Some(mandate), PlanStatus::Active).await?;
                info!(user_id = id, mandate, action = %event.action, "Mandate activated");
            }
            Ok(user_id)
        }
        ("mandates", "cancelled" | "failed" | "expired") => {
            let user_id = mandate_owner(conn, &event.links).await?;
            if let Some(id) = user_id {
                UserRepository::set_mandate(conn, id, None, PlanStatus::Cancelled).await?;
                info!(user_id = id, action = %event.action, "Mandate ended");
            }
            Ok(user_id)
        }
        ("payments", "confirmed" | "paid_out") => {
            let Some(payment) = event.links.payment.as_deref() else {
                return Ok(None);
            };
            let user_id =
                InvoiceRepository::set_status_by_payment(conn, payment, InvoiceStatus::Paid)
                    .await?;
            info!(user_id = ?user_id, payment, "Payment collected");
            Ok(user_id)
        }
        ("payments", "failed") => {
            let Some(payment) = event.links.payment.as_deref() else {
                return Ok(None);
            };
            let user_id =
                InvoiceRepository::set_status_by_payment(conn, payment, InvoiceStatus::Failed)
                    .await?;
            if let Some(id) = user_id {
                UserRepository::set_plan_status(conn, id, PlanStatus::PastDue).await?;
            }
            info!(user_id = ?user_id, payment, "Payment failed");
            Ok(user_id)
        }
        _ => {
            debug!(resource = %event.resource_type, action = %event.action, "GoCardless event recorded only");
            Ok(None)
        }
    }
}

/// The mandate's current owner, falling back to the customer link.
async fn mandate_owner(conn: &mut DbConn, links: &GcLinks) -> Result<Option<i64>> {
    if let Some(mandate) = links.mandate.as_deref() {
        if let Some(id) = UserRepository::find_by_mandate(conn, mandate).await? {
            return Ok(Some(id));
        }
    }
    match links.customer.as_deref() {
        Some(customer) => UserRepository::find_by_gocardless_customer(conn, customer).await,
        None => Ok(None),
    }
}
