//! Request DTOs for the web API.

use serde::Deserialize;
use validator::Validate;

use super::validation::{no_control_chars, required_text};
use crate::mail::{ForwardAddress, MailStatus};

/// Page/per-page query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationQuery {
    /// Clamp to sane values and convert to SQL offset/limit.
    pub fn to_offset_limit(&self) -> (i64, i64) {
        let page = i64::from(self.page.max(1));
        let per_page = i64::from(self.per_page.clamp(1, 200));
        ((page - 1).saturating_mul(per_page), per_page)
    }
}

/// PATCH /api/mail-items/:id
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTagRequest {
    /// New tag; null or blank clears it.
    #[validate(length(max = 64), custom(function = "no_control_chars"))]
    pub tag: Option<String>,
}

/// Destination address as sent by clients.
#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(max = 200), custom(function = "required_text"))]
    pub name: String,
    #[validate(length(max = 200), custom(function = "required_text"))]
    pub line1: String,
    #[serde(default)]
    #[validate(length(max = 200), custom(function = "no_control_chars"))]
    pub line2: Option<String>,
    #[validate(length(max = 200), custom(function = "required_text"))]
    pub city: String,
    #[validate(length(max = 200), custom(function = "required_text"))]
    pub postcode: String,
    #[validate(length(max = 200), custom(function = "required_text"))]
    pub country: String,
}

impl From<AddressRequest> for ForwardAddress {
    fn from(req: AddressRequest) -> Self {
        ForwardAddress {
            name: req.name.trim().to_string(),
            line1: req.line1.trim().to_string(),
            line2: req
                .line2
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            city: req.city.trim().to_string(),
            postcode: req.postcode.trim().to_string(),
            country: req.country.trim().to_string(),
        }
    }
}

/// POST /api/mail-items/:id/forward
#[derive(Debug, Deserialize, Validate)]
pub struct ForwardRequest {
    #[validate(nested)]
    pub address: AddressRequest,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// POST /api/admin/mail-items/:id/ship
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ShipRequest {
    #[serde(default)]
    #[validate(length(max = 100), custom(function = "no_control_chars"))]
    pub courier: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100), custom(function = "no_control_chars"))]
    pub tracking_number: Option<String>,
}

/// POST /api/admin/mail-items
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMailItemRequest {
    pub user_id: i64,
    #[serde(default)]
    #[validate(length(max = 64), custom(function = "no_control_chars"))]
    pub tag: Option<String>,
}

/// PATCH /api/profile
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100), custom(function = "required_text"))]
    pub name: String,
}

/// GET /api/admin/mail-items query.
#[derive(Debug, Deserialize)]
pub struct AdminMailQuery {
    #[serde(default)]
    pub status: Option<MailStatus>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl AdminMailQuery {
    pub fn pagination(&self) -> PaginationQuery {
        PaginationQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// GET /api/notifications query.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> AddressRequest {
        AddressRequest {
            name: " Ada Lovelace ".into(),
            line1: "1 Analytical St".into(),
            line2: Some("  ".into()),
            city: "London".into(),
            postcode: "N1 1AA".into(),
            country: "GB".into(),
        }
    }

    #[test]
    fn test_pagination_clamps() {
        let q = PaginationQuery {
            page: 0,
            per_page: 1000,
        };
        assert_eq!(q.to_offset_limit(), (0, 200));
        let q = PaginationQuery {
            page: 3,
            per_page: 10,
        };
        assert_eq!(q.to_offset_limit(), (20, 10));
    }

    #[test]
    fn test_pagination_huge_page_does_not_overflow() {
        let q = PaginationQuery {
            page: u32::MAX,
            per_page: 200,
        };
        assert_eq!(
            q.to_offset_limit(),
            ((i64::from(u32::MAX) - 1) * 200, 200)
        );
    }

    #[test]
    fn test_address_validation_and_conversion() {
        assert!(address().validate().is_ok());

        let mut bad = address();
        bad.city = "   ".into();
        assert!(bad.validate().is_err());

        let converted = ForwardAddress::from(address());
        assert_eq!(converted.name, "Ada Lovelace");
        assert_eq!(converted.line2, None);
    }

    #[test]
    fn test_forward_request_nested_validation() {
        let mut addr = address();
        addr.postcode = String::new();
        let req = ForwardRequest {
            address: addr,
            note: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_tag_length() {
        let req = UpdateTagRequest {
            tag: Some("x".repeat(65)),
        };
        assert!(req.validate().is_err());
        let req = UpdateTagRequest { tag: None };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_admin_query_parses_status() {
        let q: AdminMailQuery =
            serde_json::from_value(serde_json::json!({"status": "forward_requested"})).unwrap();
        assert_eq!(q.status, Some(MailStatus::ForwardRequested));
        assert!(!q.include_deleted);
        assert_eq!(q.pagination().to_offset_limit(), (0, 50));
    }
}
