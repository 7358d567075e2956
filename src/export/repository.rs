//! Export job repository.

use super::types::{ExportJob, ExportJobRow, ExportStatus};
use crate::db::DbPool;
use crate::{PostboxError, Result};

const COLUMNS: &str = "id, user_id, job_type, status, token, expires_at, file_path, file_size,
    error, created_at, started_at, completed_at, purged_at";

/// Repository for `export_jobs`.
pub struct ExportJobRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ExportJobRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a pending job.
    pub async fn create(&self, user_id: i64, job_type: &str, now: &str) -> Result<ExportJob> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO export_jobs (user_id, job_type, status, created_at)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(user_id)
        .bind(job_type)
        .bind(ExportStatus::Pending.as_str())
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| PostboxError::NotFound("export job".to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ExportJob>> {
        let sql = format!("SELECT {COLUMNS} FROM export_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(ExportJob::from))
    }

    /// A job the user can be pointed at instead of starting a new one:
    /// anything in flight, or a finished job completed at or after `done_since`.
    pub async fn find_reusable(
        &self,
        user_id: i64,
        job_type: &str,
        done_since: &str,
    ) -> Result<Option<ExportJob>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM export_jobs
             WHERE user_id = $1 AND job_type = $2
               AND (status IN ('pending', 'running')
                    OR (status = 'done' AND completed_at >= $3 AND purged_at IS NULL))
             ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(user_id)
            .bind(job_type)
            .bind(done_since)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(ExportJob::from))
    }

    /// Most recent job for a user.
    pub async fn latest_for_user(&self, user_id: i64, job_type: &str) -> Result<Option<ExportJob>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM export_jobs
             WHERE user_id = $1 AND job_type = $2
             ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(user_id)
            .bind(job_type)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(ExportJob::from))
    }

    /// Claim a pending job. Returns false if it was not pending.
    pub async fn mark_running(&self, id: i64, now: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE export_jobs SET status = 'running', started_at = $1
             WHERE id = $2 AND status = 'pending'",
        )
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_done(
        &self,
        id: i64,
        token: &str,
        expires_at: &str,
        file_path: &str,
        file_size: i64,
        now: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE export_jobs
             SET status = 'done', token = $1, expires_at = $2, file_path = $3,
                 file_size = $4, error = NULL, completed_at = $5
             WHERE id = $6",
        )
        .bind(token)
        .bind(expires_at)
        .bind(file_path)
        .bind(file_size)
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_error(&self, id: i64, message: &str, now: &str) -> Result<()> {
        sqlx::query(
            "UPDATE export_jobs SET status = 'error', error = $1, completed_at = $2 WHERE id = $3",
        )
        .bind(message)
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Look up a finished job by its download token.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<ExportJob>> {
        let sql = format!("SELECT {COLUMNS} FROM export_jobs WHERE token = $1");
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(token)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(ExportJob::from))
    }

    /// Finished jobs whose link has expired and whose archive is still on disk.
    pub async fn list_purgeable(&self, now: &str) -> Result<Vec<ExportJob>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM export_jobs
             WHERE status = 'done' AND expires_at <= $1
               AND purged_at IS NULL AND file_path IS NOT NULL
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(now)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(ExportJob::from).collect())
    }

    pub async fn mark_purged(&self, id: i64, now: &str) -> Result<()> {
        sqlx::query("UPDATE export_jobs SET purged_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
