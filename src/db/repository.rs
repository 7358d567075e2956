//! User repository for postbox.

use sqlx::QueryBuilder;

use super::user::{KycStatus, NewUser, PlanStatus, User, UserRow, UserUpdate};
use super::{Db, DbConn, DbPool};
use crate::datetime::now_db;
use crate::{PostboxError, Result};

const USER_COLUMNS: &str = "id, email, name, role, kyc_status, sumsub_review_status, plan_status,
    gocardless_customer_id, gocardless_mandate_id, email_bounced_at, email_complaint_at, created_at";

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the created user with the assigned ID.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, name, role, gocardless_customer_id, created_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(new_user.role.as_str())
        .bind(&new_user.gocardless_customer_id)
        .bind(now_db())
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Update a user by ID.
    ///
    /// Only fields that are set in the update are modified.
    /// Returns the updated user, or None if not found.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<Db> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }
        if let Some(role) = update.role {
            separated.push("role = ");
            separated.push_bind_unseparated(role.as_str());
        }
        if let Some(kyc) = update.kyc_status {
            separated.push("kyc_status = ");
            separated.push_bind_unseparated(kyc.as_str());
        }
        if let Some(plan) = update.plan_status {
            separated.push("plan_status = ");
            separated.push_bind_unseparated(plan.as_str());
        }

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// List all users, newest first.
    pub async fn list_all(&self, offset: i64, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Webhook-driven updates. These run inside the caller's transaction.
    // ------------------------------------------------------------------

    /// Stamp `email_bounced_at` for the given address. Returns the user id if matched.
    pub async fn mark_email_bounced(
        conn: &mut DbConn,
        email: &str,
        at: &str,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET email_bounced_at = $1 WHERE LOWER(email) = LOWER($2) RETURNING id",
        )
        .bind(at)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Stamp `email_complaint_at` for the given address. Returns the user id if matched.
    pub async fn mark_email_complaint(
        conn: &mut DbConn,
        email: &str,
        at: &str,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET email_complaint_at = $1 WHERE LOWER(email) = LOWER($2) RETURNING id",
        )
        .bind(at)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Record a Sumsub review outcome. Returns false if the user does not exist.
    pub async fn set_kyc_review(
        conn: &mut DbConn,
        user_id: i64,
        review_status: &str,
        kyc_status: Option<KycStatus>,
    ) -> Result<bool> {
        let result = match kyc_status {
            Some(kyc) => {
                sqlx::query(
                    "UPDATE users SET sumsub_review_status = $1, kyc_status = $2 WHERE id = $3",
                )
                .bind(review_status)
                .bind(kyc.as_str())
                .bind(user_id)
                .execute(&mut *conn)
                .await?
            }
            None => {
                sqlx::query("UPDATE users SET sumsub_review_status = $1 WHERE id = $2")
                    .bind(review_status)
                    .bind(user_id)
                    .execute(&mut *conn)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    /// Resolve a user id from an id or an email address.
    pub async fn resolve_id(
        conn: &mut DbConn,
        id: Option<i64>,
        email: Option<&str>,
    ) -> Result<Option<i64>> {
        let found: Option<i64> = match (id, email) {
            (Some(id), _) => {
                sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            (None, Some(email)) => {
                sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
                    .bind(email)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            (None, None) => None,
        };
        Ok(found)
    }

    /// Look up the owner of a GoCardless customer.
    pub async fn find_by_gocardless_customer(
        conn: &mut DbConn,
        customer_id: &str,
    ) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE gocardless_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(id)
    }

    /// Set or clear the user's mandate together with the plan status.
    pub async fn set_mandate(
        conn: &mut DbConn,
        user_id: i64,
        mandate_id: Option<&str>,
        plan_status: PlanStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET gocardless_mandate_id = $1, plan_status = $2 WHERE id = $3",
        )
        .bind(mandate_id)
        .bind(plan_status.as_str())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Look up the owner of a mandate.
    pub async fn find_by_mandate(conn: &mut DbConn, mandate_id: &str) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE gocardless_mandate_id = $1")
                .bind(mandate_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(id)
    }

    /// Set the plan status of a user.
    pub async fn set_plan_status(
        conn: &mut DbConn,
        user_id: i64,
        plan_status: PlanStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET plan_status = $1 WHERE id = $2")
            .bind(plan_status.as_str())
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
