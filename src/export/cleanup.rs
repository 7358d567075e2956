//! Expired export cleanup.
//!
//! Runs on every instance on a timer; the advisory lock makes sure only one
//! of them sweeps at a time. Rows are kept and stamped with `purged_at`.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::repository::ExportJobRepository;
use super::types::{CleanupReport, ExportSettings};
use crate::datetime::to_db;
use crate::db::{AdvisoryLock, Database, EXPORT_CLEANUP_LOCK};
use crate::Result;

/// Delete expired export archives.
///
/// Database problems are logged and reported as nothing cleaned; the sweep is
/// retried on the next tick.
pub async fn cleanup_expired(
    db: &Database,
    settings: &ExportSettings,
    holder: &str,
) -> CleanupReport {
    let lock =
        AdvisoryLock::new(EXPORT_CLEANUP_LOCK, holder).with_stale_secs(settings.lock_stale_secs);

    let guard = match lock.try_acquire(db.pool()).await {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            debug!(holder, "Export cleanup lock held elsewhere");
            return CleanupReport {
                cleaned: 0,
                locked_out: true,
            };
        }
        Err(e) => {
            log_swallowed(&e, "acquire cleanup lock");
            return CleanupReport::default();
        }
    };

    let cleaned = match sweep(db).await {
        Ok(n) => n,
        Err(e) => {
            log_swallowed(&e, "sweep expired exports");
            0
        }
    };

    if let Err(e) = guard.release().await {
        warn!(error = %e, "Failed to release export cleanup lock");
    }

    if cleaned > 0 {
        info!(cleaned, "Purged expired export archives");
    }
    CleanupReport {
        cleaned,
        locked_out: false,
    }
}

async fn sweep(db: &Database) -> Result<usize> {
    let repo = ExportJobRepository::new(db.pool());
    let now = to_db(&Utc::now());
    let mut cleaned = 0;

    for job in repo.list_purgeable(&now).await? {
        if let Some(path) = job.file_path.as_deref() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(job_id = job.id, path, "Export archive already gone");
                }
                Err(e) => {
                    warn!(job_id = job.id, path, error = %e, "Failed to delete export archive");
                    continue;
                }
            }
        }
        repo.mark_purged(job.id, &now).await?;
        cleaned += 1;
    }

    Ok(cleaned)
}

fn log_swallowed(e: &crate::PostboxError, during: &str) {
    if e.is_missing_table() {
        warn!(error = %e, "Export cleanup skipped during {during}: table missing");
    } else {
        warn!(error = %e, "Export cleanup failed during {during}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use chrono::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> ExportSettings {
        ExportSettings {
            exports_dir: dir.path().to_path_buf(),
            link_ttl: Duration::hours(24),
            reuse_window: Duration::hours(12),
            lock_stale_secs: 900,
            public_url: String::new(),
        }
    }

    async fn done_job(
        db: &Database,
        dir: &TempDir,
        uid: i64,
        name: &str,
        expires_at: &str,
    ) -> i64 {
        let path = dir.path().join(name);
        std::fs::write(&path, b"zip").unwrap();
        let repo = ExportJobRepository::new(db.pool());
        let job = repo.create(uid, "gdpr", "2024-05-01 10:00:00").await.unwrap();
        repo.mark_done(
            job.id,
            name,
            expires_at,
            &path.to_string_lossy(),
            3,
            "2024-05-01 10:00:00",
        )
        .await
        .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_purges_expired_only() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let uid = UserRepository::new(db.pool())
            .create(&NewUser::new("c@example.com", "C"))
            .await
            .unwrap()
            .id;

        let old = done_job(&db, &dir, uid, "old.zip", "2000-01-01 00:00:00").await;
        let fresh = done_job(&db, &dir, uid, "fresh.zip", "2999-01-01 00:00:00").await;

        let report = cleanup_expired(&db, &settings(&dir), "test").await;
        assert_eq!(report, CleanupReport { cleaned: 1, locked_out: false });
        assert!(!dir.path().join("old.zip").exists());
        assert!(dir.path().join("fresh.zip").exists());

        let repo = ExportJobRepository::new(db.pool());
        assert!(repo.get_by_id(old).await.unwrap().unwrap().purged_at.is_some());
        assert!(repo.get_by_id(fresh).await.unwrap().unwrap().purged_at.is_none());

        // Second sweep has nothing left and the lock was released.
        let report = cleanup_expired(&db, &settings(&dir), "test").await;
        assert_eq!(report, CleanupReport { cleaned: 0, locked_out: false });
    }

    #[tokio::test]
    async fn test_locked_out_when_held() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let uid = UserRepository::new(db.pool())
            .create(&NewUser::new("l@example.com", "L"))
            .await
            .unwrap()
            .id;
        done_job(&db, &dir, uid, "old.zip", "2000-01-01 00:00:00").await;

        let other = AdvisoryLock::new(EXPORT_CLEANUP_LOCK, "other-instance")
            .try_acquire(db.pool())
            .await
            .unwrap()
            .unwrap();

        let report = cleanup_expired(&db, &settings(&dir), "this-instance").await;
        assert_eq!(report, CleanupReport { cleaned: 0, locked_out: true });
        assert!(dir.path().join("old.zip").exists());

        other.release().await.unwrap();
        let report = cleanup_expired(&db, &settings(&dir), "this-instance").await;
        assert_eq!(report.cleaned, 1);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sweeps_purge_once() {
        use crate::config::DatabaseConfig;

        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("shared.db");
        let db = Database::connect(&DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 5,
        })
        .await
        .unwrap();
        let uid = UserRepository::new(db.pool())
            .create(&NewUser::new("j@example.com", "J"))
            .await
            .unwrap()
            .id;
        let job = done_job(&db, &dir, uid, "old.zip", "2000-01-01 00:00:00").await;

        let settings = settings(&dir);
        let (a, b) = tokio::join!(
            cleanup_expired(&db, &settings, "instance-a"),
            cleanup_expired(&db, &settings, "instance-b"),
        );

        // The loser either saw the lock held or ran after the winner and found nothing.
        assert_eq!(a.cleaned + b.cleaned, 1);
        let winner = if a.cleaned == 1 { a } else { b };
        assert!(!winner.locked_out);
        assert!(!dir.path().join("old.zip").exists());
        let repo = ExportJobRepository::new(db.pool());
        assert!(repo.get_by_id(job).await.unwrap().unwrap().purged_at.is_some());

        // Both guards were released.
        let guard = AdvisoryLock::new(EXPORT_CLEANUP_LOCK, "after")
            .try_acquire(db.pool())
            .await
            .unwrap();
        assert!(guard.is_some());
        guard.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_table_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query("DROP TABLE export_jobs").execute(db.pool()).await.unwrap();

        let report = cleanup_expired(&db, &settings(&dir), "test").await;
        assert_eq!(report, CleanupReport::default());

        // Lock was still released.
        let guard = AdvisoryLock::new(EXPORT_CLEANUP_LOCK, "after")
            .try_acquire(db.pool())
            .await
            .unwrap();
        assert!(guard.is_some());
        guard.unwrap().release().await.unwrap();
    }
}
