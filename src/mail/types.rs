//! Mail item and forwarding request types.

use serde::{Deserialize, Serialize};

use crate::datetime::parse_db;

/// Maximum length for a mail item tag.
pub const MAX_TAG_LENGTH: usize = 64;

/// Maximum length for a single address line.
pub const MAX_ADDRESS_FIELD_LENGTH: usize = 200;

/// Maximum length for a forwarding note.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Physical mail item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailStatus {
    #[default]
    Received,
    Scanned,
    Processed,
    ForwardRequested,
    Forwarded,
    Cancelled,
}

impl MailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailStatus::Received => "received",
            MailStatus::Scanned => "scanned",
            MailStatus::Processed => "processed",
            MailStatus::ForwardRequested => "forward_requested",
            MailStatus::Forwarded => "forwarded",
            MailStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(MailStatus::Received),
            "scanned" => Some(MailStatus::Scanned),
            "processed" => Some(MailStatus::Processed),
            "forward_requested" => Some(MailStatus::ForwardRequested),
            "forwarded" => Some(MailStatus::Forwarded),
            "cancelled" => Some(MailStatus::Cancelled),
            _ => None,
        }
    }

    /// No further lifecycle actions apply.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MailStatus::Forwarded | MailStatus::Cancelled)
    }
}

/// Forwarding progress, mirrored on the item and on its forwarding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingStatus {
    #[default]
    None,
    Requested,
    Processing,
    Dispatched,
    Cancelled,
}

impl ForwardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardingStatus::None => "none",
            ForwardingStatus::Requested => "requested",
            ForwardingStatus::Processing => "processing",
            ForwardingStatus::Dispatched => "dispatched",
            ForwardingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ForwardingStatus::None),
            "requested" => Some(ForwardingStatus::Requested),
            "processing" => Some(ForwardingStatus::Processing),
            "dispatched" => Some(ForwardingStatus::Dispatched),
            "cancelled" => Some(ForwardingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Raw `mail_items` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MailItemRow {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub tag: Option<String>,
    pub scanned: i32,
    pub file_id: Option<i64>,
    pub forwarding_status: String,
    pub storage_expires_at: Option<String>,
    pub deleted: i32,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One physical piece of mail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailItem {
    pub id: i64,
    /// Owner.
    pub user_id: i64,
    pub status: MailStatus,
    pub tag: Option<String>,
    /// Whether a scan has been attached.
    pub scanned: bool,
    /// Stored scan.
    pub file_id: Option<i64>,
    pub forwarding_status: ForwardingStatus,
    pub storage_expires_at: Option<String>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Set once an operator has handled the item.
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MailItemRow> for MailItem {
    fn from(row: MailItemRow) -> Self {
        MailItem {
            id: row.id,
            user_id: row.user_id,
            status: MailStatus::parse(&row.status).unwrap_or_default(),
            tag: row.tag,
            scanned: row.scanned != 0,
            file_id: row.file_id,
            forwarding_status: ForwardingStatus::parse(&row.forwarding_status)
                .unwrap_or_default(),
            storage_expires_at: row.storage_expires_at,
            deleted: row.deleted != 0,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl MailItem {
    /// Whether an operator has processed this item.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some() || self.status == MailStatus::Processed
    }

    /// Age of the item in whole seconds at `now`. Unparseable timestamps count as brand new.
    pub fn age_secs(&self, now: chrono::DateTime<chrono::Utc>) -> i64 {
        parse_db(&self.created_at)
            .map(|created| (now - created).num_seconds())
            .unwrap_or(0)
    }
}

/// Data for creating a mail item.
#[derive(Debug, Clone)]
pub struct NewMailItem {
    pub user_id: i64,
    pub status: MailStatus,
    pub tag: Option<String>,
    pub file_id: Option<i64>,
    pub storage_expires_at: Option<String>,
}

impl NewMailItem {
    /// A freshly received item with no scan.
    pub fn received(user_id: i64) -> Self {
        Self {
            user_id,
            status: MailStatus::Received,
            tag: None,
            file_id: None,
            storage_expires_at: None,
        }
    }

    /// An item created from an arriving scan.
    pub fn scanned(user_id: i64, file_id: i64) -> Self {
        Self {
            user_id,
            status: MailStatus::Scanned,
            tag: None,
            file_id: Some(file_id),
            storage_expires_at: None,
        }
    }

    /// Set the tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the storage expiry.
    pub fn with_storage_expiry(mut self, expires_at: impl Into<String>) -> Self {
        self.storage_expires_at = Some(expires_at.into());
        self
    }
}

/// Destination for a forwarded item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postcode: String,
    pub country: String,
}

/// Raw `forwarding_requests` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ForwardingRequestRow {
    pub id: i64,
    pub mail_item_id: i64,
    pub user_id: i64,
    pub status: String,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postcode: String,
    pub country: String,
    pub note: Option<String>,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A user's request to post an item on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardingRequest {
    pub id: i64,
    pub mail_item_id: i64,
    pub user_id: i64,
    pub status: ForwardingStatus,
    pub address: ForwardAddress,
    pub note: Option<String>,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ForwardingRequestRow> for ForwardingRequest {
    fn from(row: ForwardingRequestRow) -> Self {
        ForwardingRequest {
            id: row.id,
            mail_item_id: row.mail_item_id,
            user_id: row.user_id,
            status: ForwardingStatus::parse(&row.status).unwrap_or_default(),
            address: ForwardAddress {
                name: row.name,
                line1: row.line1,
                line2: row.line2,
                city: row.city,
                postcode: row.postcode,
                country: row.country,
            },
            note: row.note,
            courier: row.courier,
            tracking_number: row.tracking_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(status: &str) -> MailItemRow {
        MailItemRow {
            id: 1,
            user_id: 7,
            status: status.to_string(),
            tag: None,
            scanned: 1,
            file_id: Some(3),
            forwarding_status: "none".to_string(),
            storage_expires_at: None,
            deleted: 0,
            processed_at: None,
            created_at: "2024-03-01 12:00:00".to_string(),
            updated_at: "2024-03-01 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_status_strings() {
        for status in [
            MailStatus::Received,
            MailStatus::Scanned,
            MailStatus::Processed,
            MailStatus::ForwardRequested,
            MailStatus::Forwarded,
            MailStatus::Cancelled,
        ] {
            assert_eq!(MailStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MailStatus::parse("lost"), None);
        assert!(MailStatus::Forwarded.is_terminal());
        assert!(!MailStatus::ForwardRequested.is_terminal());
    }

    #[test]
    fn test_row_conversion() {
        let item = MailItem::from(row("forward_requested"));
        assert_eq!(item.status, MailStatus::ForwardRequested);
        assert!(item.scanned);
        assert!(!item.deleted);
        assert_eq!(item.forwarding_status, ForwardingStatus::None);
    }

    #[test]
    fn test_is_processed() {
        let mut item = MailItem::from(row("scanned"));
        assert!(!item.is_processed());
        item.processed_at = Some("2024-03-02 09:00:00".to_string());
        assert!(item.is_processed());
        assert!(MailItem::from(row("processed")).is_processed());
    }

    #[test]
    fn test_age_secs() {
        let item = MailItem::from(row("scanned"));
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(item.age_secs(now), 86_400);
    }

    #[test]
    fn test_forward_address_line2_optional() {
        let addr: ForwardAddress = serde_json::from_str(
            r#"{"name":"A","line1":"1 High St","city":"Leeds","postcode":"LS1 1AA","country":"GB"}"#,
        )
        .unwrap();
        assert_eq!(addr.line2, None);
    }
}
