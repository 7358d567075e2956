//! Response DTOs for the web API.

use serde::Serialize;

use crate::datetime::to_rfc3339;
use crate::db::{KycStatus, PlanStatus, Role, User};
use crate::export::ExportJobView;
use crate::mail::{
    ForwardAddress, ForwardingRequest, ForwardingStatus, MailAction, MailItem, MailStatus,
};
use crate::notification::Notification;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        Self {
            data,
            meta: PaginationMeta {
                page,
                per_page,
                total,
            },
        }
    }
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

// ============================================================================
// Mail DTOs
// ============================================================================

/// A mail item with the actions the caller may take on it.
#[derive(Debug, Serialize)]
pub struct MailItemResponse {
    pub id: i64,
    pub user_id: i64,
    pub status: MailStatus,
    pub tag: Option<String>,
    pub scanned: bool,
    pub file_id: Option<i64>,
    pub forwarding_status: ForwardingStatus,
    pub storage_expires_at: Option<String>,
    pub deleted: bool,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub allowed_actions: Vec<MailAction>,
}

impl MailItemResponse {
    pub fn new(item: MailItem, allowed_actions: Vec<MailAction>) -> Self {
        Self {
            id: item.id,
            user_id: item.user_id,
            status: item.status,
            tag: item.tag,
            scanned: item.scanned,
            file_id: item.file_id,
            forwarding_status: item.forwarding_status,
            storage_expires_at: item.storage_expires_at.as_deref().map(to_rfc3339),
            deleted: item.deleted,
            processed_at: item.processed_at.as_deref().map(to_rfc3339),
            created_at: to_rfc3339(&item.created_at),
            updated_at: to_rfc3339(&item.updated_at),
            allowed_actions,
        }
    }
}

/// A forwarding request.
#[derive(Debug, Serialize)]
pub struct ForwardingRequestResponse {
    pub id: i64,
    pub mail_item_id: i64,
    pub status: ForwardingStatus,
    pub address: ForwardAddress,
    pub note: Option<String>,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ForwardingRequest> for ForwardingRequestResponse {
    fn from(r: ForwardingRequest) -> Self {
        Self {
            id: r.id,
            mail_item_id: r.mail_item_id,
            status: r.status,
            address: r.address,
            note: r.note,
            courier: r.courier,
            tracking_number: r.tracking_number,
            created_at: to_rfc3339(&r.created_at),
            updated_at: to_rfc3339(&r.updated_at),
        }
    }
}

/// Result of a forward request.
#[derive(Debug, Serialize)]
pub struct ForwardResponse {
    pub item: MailItemResponse,
    pub forwarding_request: ForwardingRequestResponse,
}

// ============================================================================
// Profile / export DTOs
// ============================================================================

/// The caller's account.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub plan_status: PlanStatus,
    pub email_bounced: bool,
    pub created_at: String,
}

impl From<User> for ProfileResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            kyc_status: u.kyc_status,
            plan_status: u.plan_status,
            email_bounced: u.email_bounced_at.is_some(),
            created_at: to_rfc3339(&u.created_at),
        }
    }
}

/// Export request/status body.
#[derive(Debug, Serialize)]
pub struct ExportJobResponse {
    pub job: Option<ExportJobView>,
}

// ============================================================================
// Notification DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub mail_item_id: Option<i64>,
    pub read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        let read = n.is_read();
        Self {
            id: n.id,
            kind: n.kind,
            title: n.title,
            body: n.body,
            mail_item_id: n.mail_item_id,
            read,
            created_at: to_rfc3339(&n.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread: i64,
}

// ============================================================================
// Admin DTOs
// ============================================================================

/// Account row in the admin user list.
#[derive(Debug, Serialize)]
pub struct AdminUserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub plan_status: PlanStatus,
    pub gocardless_mandate_id: Option<String>,
    pub email_bounced_at: Option<String>,
    pub email_complaint_at: Option<String>,
    pub created_at: String,
}

impl From<User> for AdminUserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            kyc_status: u.kyc_status,
            plan_status: u.plan_status,
            gocardless_mandate_id: u.gocardless_mandate_id,
            email_bounced_at: u.email_bounced_at.as_deref().map(to_rfc3339),
            email_complaint_at: u.email_complaint_at.as_deref().map(to_rfc3339),
            created_at: to_rfc3339(&u.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_response_shape() {
        let resp = PaginatedResponse::new(vec![1, 2], 1, 50, 2);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["meta"]["total"], 2);
    }

    #[test]
    fn test_mail_item_response_timestamps() {
        let item = MailItem {
            id: 1,
            user_id: 2,
            status: MailStatus::Scanned,
            tag: None,
            scanned: true,
            file_id: Some(3),
            forwarding_status: ForwardingStatus::None,
            storage_expires_at: None,
            deleted: false,
            processed_at: None,
            created_at: "2024-05-01 10:00:00".into(),
            updated_at: "2024-05-01 10:00:00".into(),
        };
        let resp = MailItemResponse::new(item, vec![MailAction::RequestForward]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["created_at"], "2024-05-01T10:00:00Z");
        assert_eq!(json["status"], "scanned");
        assert_eq!(json["allowed_actions"], serde_json::json!(["request_forward"]));
    }
}
