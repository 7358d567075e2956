//! Provider webhook ingestion.
//!
//! Each provider handler does three things:
//! - Authorizes the transport (Basic auth and IP allowlist, or an HMAC over the raw body)
//! - Parses the payload
//! - Applies a narrow state update and logs the event, in one transaction
//!
//! Only authorization failures are refused (401, nothing written). Anything
//! after that is acknowledged with 200 so providers do not retry.

mod error;
mod events;
mod gocardless;
mod onedrive;
mod postmark;
pub mod signature;
mod sumsub;

pub use error::WebhookError;
pub use events::{AppliedEvent, WebhookEvent, WebhookEventRepository};

use std::net::IpAddr;

use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::WebhooksConfig;
use crate::datetime::now_db;
use crate::db::Database;
use crate::mail::Lifecycle;
use crate::{PostboxError, Result};

/// Signature header names.
pub mod header_names {
    pub use super::gocardless::SIGNATURE_HEADER as GOCARDLESS;
    pub use super::onedrive::SIGNATURE_HEADER as ONEDRIVE;
    pub use super::sumsub::SIGNATURE_HEADER as SUMSUB;
}

/// A webhook source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Postmark,
    Sumsub,
    GoCardless,
    OneDrive,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Postmark => "postmark",
            Provider::Sumsub => "sumsub",
            Provider::GoCardless => "gocardless",
            Provider::OneDrive => "onedrive",
        }
    }
}

/// What happened to an authorized delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Applied and logged.
    Processed,
    /// Not a payload we understand, or one that targets nothing live.
    /// At most the event log is written.
    Ignored,
    /// Processing failed and was rolled back.
    Failed,
}

/// Response body for an authorized delivery. Always sent with 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: Outcome,
    /// Number of events logged.
    pub events: usize,
}

impl WebhookAck {
    fn new(outcome: Outcome, events: usize) -> Self {
        Self {
            received: true,
            outcome,
            events,
        }
    }
}

/// Check transport authorization for a delivery.
pub fn authorize(
    provider: Provider,
    config: &WebhooksConfig,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    body: &[u8],
) -> std::result::Result<(), WebhookError> {
    let result = match provider {
        Provider::Postmark => postmark::authorize(config, headers, peer),
        Provider::Sumsub => sumsub::authorize(config, headers, body),
        Provider::GoCardless => gocardless::authorize(config, headers, body),
        Provider::OneDrive => onedrive::authorize(config, headers, body),
    };
    if let Err(ref e) = result {
        warn!(provider = provider.as_str(), reason = %e, "Webhook rejected");
    }
    result
}

/// Apply an authorized delivery.
pub async fn ingest(
    db: &Database,
    lifecycle: &Lifecycle,
    provider: Provider,
    body: &[u8],
) -> WebhookAck {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(provider = provider.as_str(), error = %e, "Webhook body is not JSON");
            return WebhookAck::new(Outcome::Ignored, 0);
        }
    };

    match apply_and_record(db, lifecycle, provider, &payload).await {
        Ok((Outcome::Ignored, count)) => {
            info!(provider = provider.as_str(), events = count, "Webhook logged without changes");
            WebhookAck::new(Outcome::Ignored, count)
        }
        Ok((outcome, count)) => {
            info!(provider = provider.as_str(), events = count, "Webhook processed");
            WebhookAck::new(outcome, count)
        }
        Err(PostboxError::Validation(msg)) => {
            warn!(provider = provider.as_str(), error = %msg, "Webhook payload ignored");
            WebhookAck::new(Outcome::Ignored, 0)
        }
        Err(e) => {
            error!(provider = provider.as_str(), error = %e, "Webhook processing failed");
            WebhookAck::new(Outcome::Failed, 0)
        }
    }
}

async fn apply_and_record(
    db: &Database,
    lifecycle: &Lifecycle,
    provider: Provider,
    payload: &serde_json::Value,
) -> Result<(Outcome, usize)> {
    let now = now_db();
    let mut tx = db.begin().await?;

    let applied = match provider {
        Provider::Postmark => postmark::apply(&mut tx, payload, &now).await?,
        Provider::Sumsub => sumsub::apply(&mut tx, payload).await?,
        Provider::GoCardless => gocardless::apply(&mut tx, payload).await?,
        Provider::OneDrive => onedrive::apply(&mut tx, lifecycle, payload, &now).await?,
    };
    for event in &applied {
        WebhookEventRepository::record(&mut tx, provider.as_str(), event, &now).await?;
    }

    tx.commit().await?;
    let outcome = if !applied.is_empty() && applied.iter().all(|e| e.ignored) {
        Outcome::Ignored
    } else {
        Outcome::Processed
    };
    Ok((outcome, applied.len()))
}

fn parse_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| PostboxError::Validation(format!("invalid payload: {e}")))
}
