//! Invoice model and repository.

use serde::Serialize;

use crate::db::DbConn;
use crate::Result;

/// Payment state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Failed => "failed",
        }
    }
}

/// A stored invoice.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub user_id: i64,
    pub amount_pence: i64,
    pub currency: String,
    pub status: String,
    pub gocardless_payment_id: Option<String>,
    pub created_at: String,
}

const COLUMNS: &str = "id, user_id, amount_pence, currency, status, gocardless_payment_id, created_at";

/// Repository for invoice operations.
pub struct InvoiceRepository;

impl InvoiceRepository {
    /// Record a pending invoice collected through a GoCardless payment.
    pub async fn create(
        conn: &mut DbConn,
        user_id: i64,
        amount_pence: i64,
        currency: &str,
        payment_id: Option<&str>,
        now: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO invoices (user_id, amount_pence, currency, status, gocardless_payment_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(user_id)
        .bind(amount_pence)
        .bind(currency)
        .bind(InvoiceStatus::Pending.as_str())
        .bind(payment_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Update the invoice linked to a payment. Returns the owning user id if one matched.
    pub async fn set_status_by_payment(
        conn: &mut DbConn,
        payment_id: &str,
        status: InvoiceStatus,
    ) -> Result<Option<i64>> {
        let user_id: Option<i64> = sqlx::query_scalar(
            "UPDATE invoices SET status = $1 WHERE gocardless_payment_id = $2 RETURNING user_id",
        )
        .bind(status.as_str())
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(user_id)
    }

    /// List a user's invoices.
    pub async fn list_for_user(conn: &mut DbConn, user_id: i64) -> Result<Vec<Invoice>> {
        let sql = format!("SELECT {COLUMNS} FROM invoices WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, Invoice>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}

#[cfg(all(test, not(feature = "postgres")))]
mod tests {
    use super::*;
    use crate::datetime::now_db;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    #[tokio::test]
    async fn test_payment_status_updates() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("pay@example.com", "Pay"))
            .await
            .unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        InvoiceRepository::create(&mut conn, user.id, 999, "GBP", Some("PM1"), &now_db())
            .await
            .unwrap();

        let owner = InvoiceRepository::set_status_by_payment(&mut conn, "PM1", InvoiceStatus::Paid)
            .await
            .unwrap();
        assert_eq!(owner, Some(user.id));
        assert_eq!(
            InvoiceRepository::set_status_by_payment(&mut conn, "PM404", InvoiceStatus::Paid)
                .await
                .unwrap(),
            None
        );

        let invoices = InvoiceRepository::list_for_user(&mut conn, user.id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].status, "paid");
        assert_eq!(invoices[0].amount_pence, 999);
    }
}
