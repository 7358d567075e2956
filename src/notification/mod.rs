//! In-app notifications.
//!
//! Notifications are written by the mail lifecycle and the export runner,
//! usually inside the same transaction as the change they describe.

mod repository;

pub use repository::{NewNotification, Notification, NotificationKind, NotificationRepository};
