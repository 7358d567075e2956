//! Notification model and repository.

use serde::Serialize;

use crate::db::DbConn;
use crate::Result;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    MailScanned,
    ForwardRequested,
    MailForwarded,
    MailCancelled,
    ExportReady,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::MailScanned => "mail_scanned",
            NotificationKind::ForwardRequested => "forward_requested",
            NotificationKind::MailForwarded => "mail_forwarded",
            NotificationKind::MailCancelled => "mail_cancelled",
            NotificationKind::ExportReady => "export_ready",
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub mail_item_id: Option<i64>,
    pub read_at: Option<String>,
    pub created_at: String,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Data for creating a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub mail_item_id: Option<i64>,
}

impl NewNotification {
    pub fn mail_scanned(user_id: i64, mail_item_id: i64) -> Self {
        Self {
            user_id,
            kind: NotificationKind::MailScanned,
            title: "New mail scanned".to_string(),
            body: "A new item has arrived and its scan is ready to view.".to_string(),
            mail_item_id: Some(mail_item_id),
        }
    }

    pub fn forward_requested(user_id: i64, mail_item_id: i64) -> Self {
        Self {
            user_id,
            kind: NotificationKind::ForwardRequested,
            title: "Forwarding requested".to_string(),
            body: "We have received your forwarding request.".to_string(),
            mail_item_id: Some(mail_item_id),
        }
    }

    pub fn mail_forwarded(
        user_id: i64,
        mail_item_id: i64,
        courier: Option<&str>,
        tracking_number: Option<&str>,
    ) -> Self {
        let body = match (courier, tracking_number) {
            (Some(c), Some(t)) => format!("Your item is on its way with {c} (tracking {t})."),
            (Some(c), None) => format!("Your item is on its way with {c}."),
            _ => "Your item is on its way.".to_string(),
        };
        Self {
            user_id,
            kind: NotificationKind::MailForwarded,
            title: "Mail forwarded".to_string(),
            body,
            mail_item_id: Some(mail_item_id),
        }
    }

    pub fn mail_cancelled(user_id: i64, mail_item_id: i64) -> Self {
        Self {
            user_id,
            kind: NotificationKind::MailCancelled,
            title: "Mail item cancelled".to_string(),
            body: "An operator has cancelled handling of this item.".to_string(),
            mail_item_id: Some(mail_item_id),
        }
    }

    pub fn export_ready(user_id: i64) -> Self {
        Self {
            user_id,
            kind: NotificationKind::ExportReady,
            title: "Your data export is ready".to_string(),
            body: "Download it from your profile within 24 hours.".to_string(),
            mail_item_id: None,
        }
    }
}

const COLUMNS: &str = "id, user_id, kind, title, body, mail_item_id, read_at, created_at";

/// Repository for notification operations.
pub struct NotificationRepository;

impl NotificationRepository {
    /// Store a notification.
    pub async fn create(conn: &mut DbConn, new: &NewNotification, now: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notifications (user_id, kind, title, body, mail_item_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.mail_item_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// List a user's notifications, newest first.
    pub async fn list_for_user(
        conn: &mut DbConn,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE user_id = $1 AND ($2 = 0 OR read_at IS NULL)
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(i32::from(unread_only))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Count unread notifications.
    pub async fn count_unread(conn: &mut DbConn, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Mark one of the user's notifications read. Returns false if it is not theirs.
    pub async fn mark_read(conn: &mut DbConn, user_id: i64, id: i64, now: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, $1)
             WHERE id = $2 AND user_id = $3",
        )
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(all(test, not(feature = "postgres")))]
mod tests {
    use super::*;
    use crate::datetime::now_db;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    #[tokio::test]
    async fn test_create_list_and_mark_read() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let alice = repo.create(&NewUser::new("a@example.com", "A")).await.unwrap();
        let bob = repo.create(&NewUser::new("b@example.com", "B")).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let id = NotificationRepository::create(
            &mut conn,
            &NewNotification::export_ready(alice.id),
            &now_db(),
        )
        .await
        .unwrap();
        NotificationRepository::create(
            &mut conn,
            &NewNotification::mail_forwarded(alice.id, 1, Some("DPD"), None),
            &now_db(),
        )
        .await
        .unwrap();

        assert_eq!(NotificationRepository::count_unread(&mut conn, alice.id).await.unwrap(), 2);
        assert!(!NotificationRepository::mark_read(&mut conn, bob.id, id, &now_db())
            .await
            .unwrap());
        assert!(NotificationRepository::mark_read(&mut conn, alice.id, id, &now_db())
            .await
            .unwrap());

        let unread = NotificationRepository::list_for_user(&mut conn, alice.id, true)
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].kind, "mail_forwarded");
        assert!(unread[0].body.contains("DPD"));

        let all = NotificationRepository::list_for_user(&mut conn, alice.id, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(Notification::is_read));
    }
}
