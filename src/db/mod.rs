//! Database module for postbox.
//!
//! Connection pooling, embedded migrations and the repositories for the
//! account-level tables. The backend is picked at compile time: SQLite by
//! default, PostgreSQL with the `postgres` feature.

mod lock;
mod repository;
mod schema;
mod user;

pub use lock::{AdvisoryLock, LockGuard, EXPORT_CLEANUP_LOCK};
pub use repository::UserRepository;
pub use schema::MIGRATIONS;
pub use user::{KycStatus, NewUser, PlanStatus, Role, User, UserUpdate};

use std::time::Duration;

use sqlx::pool::PoolOptions;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::Result;

/// SQL backend selected at compile time.
#[cfg(not(feature = "postgres"))]
pub type Db = sqlx::Sqlite;
/// SQL backend selected at compile time.
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

/// Connection pool for the selected backend.
pub type DbPool = sqlx::Pool<Db>;

/// A single connection, usually borrowed from a transaction (`&mut *tx`).
pub type DbConn = <Db as sqlx::Database>::Connection;

/// Open transaction on the pool.
pub type DbTransaction = sqlx::Transaction<'static, Db>;

/// Database wrapper owning the connection pool.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect using the configured URL and apply pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database");

        #[cfg(not(feature = "postgres"))]
        ensure_sqlite_parent_dir(&config.url)?;

        let pool = PoolOptions::<Db>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options(&config.url)?)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// A single, never-recycled connection keeps the in-memory database alive
    /// for the lifetime of the pool.
    #[cfg(not(feature = "postgres"))]
    pub async fn open_in_memory() -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = PoolOptions::<Db>::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Begin a new transaction.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }

        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.unwrap_or(0))
    }

    /// Apply pending migrations, one transaction per migration.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     BIGINT PRIMARY KEY,
                applied_at  TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version = self.schema_version().await?;
        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            let mut tx = self.pool.begin().await?;

            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2)")
                .bind(version)
                .bind(crate::datetime::now_db())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            debug!("Migration v{} applied", version);
        }

        info!("Database migration complete (now at version {})", MIGRATIONS.len());
        Ok(())
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        #[cfg(not(feature = "postgres"))]
        let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1";
        #[cfg(feature = "postgres")]
        let sql = "SELECT COUNT(*) FROM information_schema.tables \
                   WHERE table_schema = current_schema() AND table_name = $1";

        let count: i64 = sqlx::query_scalar(sql)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(not(feature = "postgres"))]
fn connect_options(url: &str) -> Result<sqlx::sqlite::SqliteConnectOptions> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
    use std::str::FromStr;

    Ok(SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5)))
}

#[cfg(feature = "postgres")]
fn connect_options(url: &str) -> Result<sqlx::postgres::PgConnectOptions> {
    use std::str::FromStr;

    Ok(sqlx::postgres::PgConnectOptions::from_str(url)?)
}

#[cfg(not(feature = "postgres"))]
fn ensure_sqlite_parent_dir(url: &str) -> Result<()> {
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(all(test, not(feature = "postgres")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let db = Database::open_in_memory().await.unwrap();
        for table in [
            "users",
            "mail_items",
            "forwarding_requests",
            "export_jobs",
            "notifications",
            "webhook_events",
            "files",
            "invoices",
            "maintenance_locks",
        ] {
            assert!(db.table_exists(table).await.unwrap(), "{table} missing");
        }
        assert!(!db.table_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_table_is_classified() {
        let db = Database::open_in_memory().await.unwrap();
        let err: crate::PostboxError = sqlx::query("SELECT * FROM no_such_thing")
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(err.is_missing_table());
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = Database::open_in_memory().await.unwrap();
        {
            let mut tx = db.begin().await.unwrap();
            sqlx::query("INSERT INTO users (email, name, role, created_at) VALUES ($1, $2, $3, $4)")
                .bind("rollback@example.com")
                .bind("Rollback")
                .bind("user")
                .bind(crate::datetime::now_db())
                .execute(&mut *tx)
                .await
                .unwrap();
            // dropped without commit
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_connect_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("nested/postbox.db").display());
        let config = DatabaseConfig {
            url,
            max_connections: 2,
        };

        {
            let db = Database::connect(&config).await.unwrap();
            assert!(db.table_exists("users").await.unwrap());
        }

        let db = Database::connect(&config).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }
}
