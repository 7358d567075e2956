//! User model for postbox.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Account role.
///
/// `Admin` is the only elevated role; there is no separate `is_admin` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular customer.
    #[default]
    User,
    /// Back-office operator.
    Admin,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Whether this role may use the admin API.
    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// KYC verification state, driven by Sumsub review callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    NotStarted,
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::NotStarted => "not_started",
            KycStatus::Pending => "pending",
            KycStatus::Verified => "verified",
            KycStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(KycStatus::NotStarted),
            "pending" => Some(KycStatus::Pending),
            "verified" => Some(KycStatus::Verified),
            "rejected" => Some(KycStatus::Rejected),
            _ => None,
        }
    }
}

/// Subscription state, driven by GoCardless callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    None,
    Active,
    PastDue,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::None => "none",
            PlanStatus::Active => "active",
            PlanStatus::PastDue => "past_due",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(PlanStatus::None),
            "active" => Some(PlanStatus::Active),
            "past_due" => Some(PlanStatus::PastDue),
            "cancelled" => Some(PlanStatus::Cancelled),
            _ => None,
        }
    }
}

/// Raw `users` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub kyc_status: String,
    pub sumsub_review_status: Option<String>,
    pub plan_status: String,
    pub gocardless_customer_id: Option<String>,
    pub gocardless_mandate_id: Option<String>,
    pub email_bounced_at: Option<String>,
    pub email_complaint_at: Option<String>,
    pub created_at: String,
}

/// Account entity.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login / contact email (unique).
    pub email: String,
    /// Display name.
    pub name: String,
    /// Account role.
    pub role: Role,
    /// KYC verification state.
    pub kyc_status: KycStatus,
    /// Last review status reported by Sumsub.
    pub sumsub_review_status: Option<String>,
    /// Subscription state.
    pub plan_status: PlanStatus,
    /// GoCardless customer id.
    pub gocardless_customer_id: Option<String>,
    /// Active GoCardless mandate id.
    pub gocardless_mandate_id: Option<String>,
    /// When Postmark reported a hard bounce.
    pub email_bounced_at: Option<String>,
    /// When Postmark reported a spam complaint.
    pub email_complaint_at: Option<String>,
    /// Account creation timestamp.
    pub created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse().unwrap_or_default(),
            kyc_status: KycStatus::parse(&row.kyc_status).unwrap_or_default(),
            sumsub_review_status: row.sumsub_review_status,
            plan_status: PlanStatus::parse(&row.plan_status).unwrap_or_default(),
            gocardless_customer_id: row.gocardless_customer_id,
            gocardless_mandate_id: row.gocardless_mandate_id,
            email_bounced_at: row.email_bounced_at,
            email_complaint_at: row.email_complaint_at,
            created_at: row.created_at,
        }
    }
}

impl User {
    /// Check if this user may use the admin API.
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub gocardless_customer_id: Option<String>,
}

impl NewUser {
    /// Create a new regular user.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            role: Role::User,
            gocardless_customer_id: None,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Link a GoCardless customer.
    pub fn with_gocardless_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.gocardless_customer_id = Some(customer_id.into());
        self
    }
}

/// Data for updating an existing user.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub kyc_status: Option<KycStatus>,
    pub plan_status: Option<PlanStatus>,
}

impl UserUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the role.
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Check if the update is empty.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role.is_none()
            && self.kyc_status.is_none()
            && self.plan_status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("sysop".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_role_is_admin() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(KycStatus::parse("verified"), Some(KycStatus::Verified));
        assert_eq!(KycStatus::parse("bogus"), None);
        assert_eq!(PlanStatus::parse("past_due"), Some(PlanStatus::PastDue));
        assert_eq!(PlanStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_row_conversion_defaults_unknown_values() {
        let row = UserRow {
            id: 1,
            email: "a@example.com".into(),
            name: "A".into(),
            role: "superuser".into(),
            kyc_status: "weird".into(),
            sumsub_review_status: None,
            plan_status: "active".into(),
            gocardless_customer_id: None,
            gocardless_mandate_id: None,
            email_bounced_at: None,
            email_complaint_at: None,
            created_at: "2024-01-01 00:00:00".into(),
        };
        let user = User::from(row);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.kyc_status, KycStatus::NotStarted);
        assert_eq!(user.plan_status, PlanStatus::Active);
    }

    #[test]
    fn test_user_update_is_empty() {
        assert!(UserUpdate::new().is_empty());
        assert!(!UserUpdate::new().name("x").is_empty());
    }
}
