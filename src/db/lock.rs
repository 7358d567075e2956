//! Cross-instance advisory locks for maintenance jobs.
//!
//! On PostgreSQL this is a session-level `pg_try_advisory_lock` held on a
//! dedicated pooled connection. On SQLite a row in `maintenance_locks` plays
//! the same role; rows older than the stale timeout are taken over.

use tracing::{debug, warn};

use super::DbPool;
use crate::Result;

/// Lock key for the export cleanup sweep.
pub const EXPORT_CLEANUP_LOCK: i64 = 0x7062_6578_706f_7274;

/// A named advisory lock.
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    key: i64,
    holder: String,
    stale_secs: i64,
}

impl AdvisoryLock {
    /// Create a lock handle for `key`, identified by `holder` while held.
    pub fn new(key: i64, holder: impl Into<String>) -> Self {
        Self {
            key,
            holder: holder.into(),
            stale_secs: 900,
        }
    }

    /// Override how long a SQLite lock row may live before it is considered abandoned.
    pub fn with_stale_secs(mut self, stale_secs: i64) -> Self {
        self.stale_secs = stale_secs;
        self
    }

    /// Lock key.
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Try to take the lock without waiting.
    ///
    /// Returns `None` if another holder has it.
    #[cfg(not(feature = "postgres"))]
    pub async fn try_acquire(&self, pool: &DbPool) -> Result<Option<LockGuard>> {
        use crate::datetime::{db_offset_from_now, now_db};

        let stale_before = db_offset_from_now(chrono::Duration::seconds(-self.stale_secs));
        let reaped = sqlx::query(
            "DELETE FROM maintenance_locks WHERE lock_key = $1 AND acquired_at < $2",
        )
        .bind(self.key)
        .bind(&stale_before)
        .execute(pool)
        .await?;
        if reaped.rows_affected() > 0 {
            warn!(key = self.key, "Took over stale maintenance lock");
        }

        let inserted = sqlx::query(
            "INSERT INTO maintenance_locks (lock_key, holder, acquired_at) VALUES ($1, $2, $3)
             ON CONFLICT (lock_key) DO NOTHING",
        )
        .bind(self.key)
        .bind(&self.holder)
        .bind(now_db())
        .execute(pool)
        .await?;

        if inserted.rows_affected() == 0 {
            debug!(key = self.key, "Maintenance lock held elsewhere");
            return Ok(None);
        }

        debug!(key = self.key, holder = %self.holder, "Maintenance lock acquired");
        Ok(Some(LockGuard {
            pool: pool.clone(),
            key: self.key,
            holder: self.holder.clone(),
            released: false,
        }))
    }

    /// Try to take the lock without waiting.
    ///
    /// Returns `None` if another session has it.
    #[cfg(feature = "postgres")]
    pub async fn try_acquire(&self, pool: &DbPool) -> Result<Option<LockGuard>> {
        let mut conn = pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.key)
            .fetch_one(&mut *conn)
            .await?;

        if !locked {
            debug!(key = self.key, "Advisory lock held elsewhere");
            return Ok(None);
        }

        debug!(key = self.key, holder = %self.holder, "Advisory lock acquired");
        Ok(Some(LockGuard {
            conn: Some(conn),
            key: self.key,
            holder: self.holder.clone(),
        }))
    }
}

/// A held advisory lock. Call [`LockGuard::release`] on every exit path.
#[cfg(not(feature = "postgres"))]
pub struct LockGuard {
    pool: DbPool,
    key: i64,
    holder: String,
    released: bool,
}

#[cfg(not(feature = "postgres"))]
impl LockGuard {
    /// Release the lock.
    pub async fn release(mut self) -> Result<()> {
        sqlx::query("DELETE FROM maintenance_locks WHERE lock_key = $1 AND holder = $2")
            .bind(self.key)
            .bind(&self.holder)
            .execute(&self.pool)
            .await?;
        self.released = true;
        debug!(key = self.key, "Maintenance lock released");
        Ok(())
    }
}

#[cfg(not(feature = "postgres"))]
impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            // The row stays until it goes stale.
            warn!(key = self.key, holder = %self.holder, "Maintenance lock dropped without release");
        }
    }
}

/// A held advisory lock. Call [`LockGuard::release`] on every exit path.
#[cfg(feature = "postgres")]
pub struct LockGuard {
    conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>>,
    key: i64,
    holder: String,
}

#[cfg(feature = "postgres")]
impl LockGuard {
    /// Release the lock.
    ///
    /// If the unlock does not succeed the session is closed instead of being
    /// returned to the pool, which drops the lock server-side.
    pub async fn release(mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let unlocked: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .fetch_one(&mut *conn)
                .await;

        match after_unlock(&unlocked) {
            AfterUnlock::ReturnToPool => {
                debug!(key = self.key, "Advisory lock released");
                Ok(())
            }
            AfterUnlock::CloseSession => {
                warn!(key = self.key, holder = %self.holder, "Advisory unlock failed, closing session");
                drop(conn.detach());
                unlocked.map(|_| ()).map_err(Into::into)
            }
        }
    }
}

/// What to do with the lock's connection once the unlock query has run.
#[cfg(any(feature = "postgres", test))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterUnlock {
    ReturnToPool,
    CloseSession,
}

/// Only a confirmed unlock lets the session go back to the pool.
#[cfg(any(feature = "postgres", test))]
fn after_unlock(result: &std::result::Result<bool, sqlx::Error>) -> AfterUnlock {
    match result {
        Ok(true) => AfterUnlock::ReturnToPool,
        Ok(false) | Err(_) => AfterUnlock::CloseSession,
    }
}

#[cfg(feature = "postgres")]
impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Closing the session releases the lock; the connection must not go back to the pool.
            warn!(key = self.key, holder = %self.holder, "Advisory lock dropped without release");
            drop(conn.detach());
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .finish()
    }
}
