//! Collect a user's data for export.
//!
//! Each entity becomes one JSON array file in the archive. A table that does
//! not exist yet yields an empty array instead of failing the export.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::billing::InvoiceRepository;
use crate::db::{Database, UserRepository};
use crate::file::FileRepository;
use crate::mail::{ForwardingRequestRepository, MailItemRepository};
use crate::notification::NotificationRepository;
use crate::webhooks::WebhookEventRepository;
use crate::{PostboxError, Result};

/// One file inside the export archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry {
    pub name: String,
    pub contents: Vec<u8>,
}

impl ExportEntry {
    fn json(name: &str, value: &Value) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            contents: serde_json::to_vec_pretty(value)?,
        })
    }
}

/// Gather every entity for `user_id`, plus a manifest listing record counts.
pub async fn gather_user_data(
    db: &Database,
    user_id: i64,
    generated_at: &str,
) -> Result<Vec<ExportEntry>> {
    let profile = UserRepository::new(db.pool())
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| PostboxError::NotFound("user".to_string()))?;

    let mut conn = db.pool().acquire().await?;
    let sections = [
        (
            "mail_items.json",
            soft(
                "mail_items",
                MailItemRepository::list_all_for_user(&mut conn, user_id).await,
            )?,
        ),
        (
            "forwarding_requests.json",
            soft(
                "forwarding_requests",
                ForwardingRequestRepository::list_for_user(&mut conn, user_id).await,
            )?,
        ),
        (
            "notifications.json",
            soft(
                "notifications",
                NotificationRepository::list_for_user(&mut conn, user_id, false).await,
            )?,
        ),
        (
            "invoices.json",
            soft(
                "invoices",
                InvoiceRepository::list_for_user(&mut conn, user_id).await,
            )?,
        ),
        (
            "provider_events.json",
            soft(
                "webhook_events",
                WebhookEventRepository::list_for_user(&mut conn, user_id).await,
            )?,
        ),
        (
            "files.json",
            soft("files", FileRepository::list_for_user(&mut conn, user_id).await)?,
        ),
    ];
    drop(conn);

    let mut counts = serde_json::Map::new();
    let mut entries = Vec::with_capacity(sections.len() + 2);
    entries.push(ExportEntry::json("profile.json", &serde_json::to_value(&profile)?)?);
    for (name, records) in &sections {
        let len = records.as_array().map_or(0, Vec::len);
        counts.insert(name.trim_end_matches(".json").to_string(), len.into());
        entries.push(ExportEntry::json(name, records)?);
    }

    let manifest = json!({
        "userId": user_id,
        "type": "gdpr",
        "generatedAt": crate::datetime::to_rfc3339(generated_at),
        "counts": Value::Object(counts),
    });
    entries.push(ExportEntry::json("manifest.json", &manifest)?);

    Ok(entries)
}

/// Serialize a list, treating a missing table as an empty list.
fn soft<T: Serialize>(table: &str, result: Result<Vec<T>>) -> Result<Value> {
    match result {
        Ok(rows) => Ok(serde_json::to_value(rows)?),
        Err(e) if e.is_missing_table() => {
            warn!(table, "Table missing during export; writing empty list");
            Ok(Value::Array(Vec::new()))
        }
        Err(e) => Err(e),
    }
}
