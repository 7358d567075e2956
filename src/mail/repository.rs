//! Mail item and forwarding request repositories.
//!
//! Functions take a connection so they can run either on a pooled connection
//! or inside a caller's transaction (`&mut *tx`).

use super::lifecycle::Transition;
use super::types::{
    ForwardAddress, ForwardingRequest, ForwardingRequestRow, ForwardingStatus, MailItem,
    MailItemRow, MailStatus, NewMailItem,
};
use crate::db::DbConn;
use crate::Result;

const MAIL_ITEM_COLUMNS: &str = "id, user_id, status, tag, scanned, file_id, forwarding_status,
    storage_expires_at, deleted, processed_at, created_at, updated_at";

const FORWARDING_COLUMNS: &str = "id, mail_item_id, user_id, status, name, line1, line2, city,
    postcode, country, note, courier, tracking_number, created_at, updated_at";

/// Repository for mail item operations.
pub struct MailItemRepository;

impl MailItemRepository {
    /// Create a new mail item.
    pub async fn create(conn: &mut DbConn, item: &NewMailItem, now: &str) -> Result<MailItem> {
        let scanned = i32::from(item.file_id.is_some() || item.status != MailStatus::Received);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO mail_items
                (user_id, status, tag, scanned, file_id, storage_expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING id",
        )
        .bind(item.user_id)
        .bind(item.status.as_str())
        .bind(&item.tag)
        .bind(scanned)
        .bind(item.file_id)
        .bind(&item.storage_expires_at)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| crate::PostboxError::NotFound("mail item".to_string()))
    }

    /// Get a mail item by ID, including soft-deleted ones.
    pub async fn get_by_id(conn: &mut DbConn, id: i64) -> Result<Option<MailItem>> {
        let sql = format!("SELECT {MAIL_ITEM_COLUMNS} FROM mail_items WHERE id = $1");
        let row = sqlx::query_as::<_, MailItemRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(MailItem::from))
    }

    /// Get the item a stored scan belongs to.
    pub async fn get_by_file_id(conn: &mut DbConn, file_id: i64) -> Result<Option<MailItem>> {
        let sql = format!(
            "SELECT {MAIL_ITEM_COLUMNS} FROM mail_items WHERE file_id = $1 ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, MailItemRow>(&sql)
            .bind(file_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(MailItem::from))
    }

    /// List a user's visible items, newest first.
    pub async fn list_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<MailItem>> {
        let sql = format!(
            "SELECT {MAIL_ITEM_COLUMNS} FROM mail_items
             WHERE user_id = $1 AND deleted = 0
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, MailItemRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(MailItem::from).collect())
    }

    /// List every item a user has ever had, deleted ones included.
    pub async fn list_all_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<MailItem>> {
        let sql = format!(
            "SELECT {MAIL_ITEM_COLUMNS} FROM mail_items WHERE user_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MailItemRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(MailItem::from).collect())
    }

    /// List items across all users for the back office.
    pub async fn list_all(
        conn: &mut DbConn,
        status: Option<MailStatus>,
        include_deleted: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MailItem>> {
        let sql = format!(
            "SELECT {MAIL_ITEM_COLUMNS} FROM mail_items
             WHERE ($1 IS NULL OR status = $1) AND ($2 = 1 OR deleted = 0)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, MailItemRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(i32::from(include_deleted))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(MailItem::from).collect())
    }

    /// Apply an accepted lifecycle transition.
    ///
    /// The update only matches while the item is still in `transition.from`
    /// and not deleted, so a concurrent change makes this return `false`.
    pub async fn apply(
        conn: &mut DbConn,
        id: i64,
        transition: &Transition,
        now: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE mail_items SET
                status = $1,
                forwarding_status = COALESCE($2, forwarding_status),
                processed_at = CASE WHEN $3 = 1 THEN $4 ELSE processed_at END,
                deleted = CASE WHEN $5 = 1 THEN 1 ELSE deleted END,
                updated_at = $4
             WHERE id = $6 AND status = $7 AND deleted = 0",
        )
        .bind(transition.to.as_str())
        .bind(transition.forwarding_status.map(|s| s.as_str()))
        .bind(i32::from(transition.stamp_processed))
        .bind(now)
        .bind(i32::from(transition.delete))
        .bind(id)
        .bind(transition.from.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Link a stored scan to an item.
    pub async fn attach_scan(conn: &mut DbConn, id: i64, file_id: i64, now: &str) -> Result<()> {
        sqlx::query(
            "UPDATE mail_items SET scanned = 1, file_id = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(file_id)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Set or clear the tag.
    pub async fn update_tag(
        conn: &mut DbConn,
        id: i64,
        tag: Option<&str>,
        now: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE mail_items SET tag = $1, updated_at = $2 WHERE id = $3 AND deleted = 0",
        )
        .bind(tag)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Repository for forwarding request operations.
pub struct ForwardingRequestRepository;

impl ForwardingRequestRepository {
    /// Create a forwarding request for an item.
    pub async fn create(
        conn: &mut DbConn,
        mail_item_id: i64,
        user_id: i64,
        address: &ForwardAddress,
        note: Option<&str>,
        now: &str,
    ) -> Result<ForwardingRequest> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO forwarding_requests
                (mail_item_id, user_id, status, name, line1, line2, city, postcode, country,
                 note, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) RETURNING id",
        )
        .bind(mail_item_id)
        .bind(user_id)
        .bind(ForwardingStatus::Requested.as_str())
        .bind(&address.name)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.postcode)
        .bind(&address.country)
        .bind(note)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| crate::PostboxError::NotFound("forwarding request".to_string()))
    }

    /// Get a forwarding request by ID.
    pub async fn get_by_id(conn: &mut DbConn, id: i64) -> Result<Option<ForwardingRequest>> {
        let sql = format!("SELECT {FORWARDING_COLUMNS} FROM forwarding_requests WHERE id = $1");
        let row = sqlx::query_as::<_, ForwardingRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(ForwardingRequest::from))
    }

    /// The most recent forwarding request for an item.
    pub async fn latest_for_item(
        conn: &mut DbConn,
        mail_item_id: i64,
    ) -> Result<Option<ForwardingRequest>> {
        let sql = format!(
            "SELECT {FORWARDING_COLUMNS} FROM forwarding_requests
             WHERE mail_item_id = $1 ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ForwardingRequestRow>(&sql)
            .bind(mail_item_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(ForwardingRequest::from))
    }

    /// List a user's forwarding requests, newest first.
    pub async fn list_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<ForwardingRequest>> {
        let sql = format!(
            "SELECT {FORWARDING_COLUMNS} FROM forwarding_requests
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ForwardingRequestRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(ForwardingRequest::from).collect())
    }

    /// Update the status of a request.
    pub async fn set_status(
        conn: &mut DbConn,
        id: i64,
        status: ForwardingStatus,
        now: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE forwarding_requests SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Record dispatch details.
    pub async fn mark_dispatched(
        conn: &mut DbConn,
        id: i64,
        courier: Option<&str>,
        tracking_number: Option<&str>,
        now: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE forwarding_requests
             SET status = $1, courier = $2, tracking_number = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(ForwardingStatus::Dispatched.as_str())
        .bind(courier)
        .bind(tracking_number)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
