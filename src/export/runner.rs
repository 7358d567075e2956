//! Background export runner.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};

use super::archive::write_archive_blocking;
use super::gather::gather_user_data;
use super::repository::ExportJobRepository;
use super::types::{ExportJob, ExportSettings};
use crate::datetime::to_db;
use crate::db::Database;
use crate::notification::{NewNotification, NotificationRepository};
use crate::Result;

/// Length of a download token in bytes before hex encoding.
const TOKEN_BYTES: usize = 32;

/// Runs export jobs to completion.
#[derive(Clone)]
pub struct ExportRunner {
    db: Arc<Database>,
    settings: ExportSettings,
}

impl ExportRunner {
    pub fn new(db: Arc<Database>, settings: ExportSettings) -> Self {
        Self { db, settings }
    }

    /// Run `job_id` in the background. Clients poll the job status.
    pub fn spawn(&self, job_id: i64) {
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run(job_id).await {
                error!(job_id, error = %e, "Export runner failed to record outcome");
            }
        });
    }

    /// Run a pending job. Returns the job as it ended up.
    ///
    /// Failures while building the archive are written to the job row; only
    /// failures to update the row itself are returned.
    pub async fn run(&self, job_id: i64) -> Result<Option<ExportJob>> {
        let repo = ExportJobRepository::new(self.db.pool());
        if !repo.mark_running(job_id, &to_db(&Utc::now())).await? {
            warn!(job_id, "Export job is not pending; skipping");
            return repo.get_by_id(job_id).await;
        }

        let Some(job) = repo.get_by_id(job_id).await? else {
            return Ok(None);
        };

        match self.build(&job).await {
            Ok(()) => {
                info!(job_id, user_id = job.user_id, "Export finished");
            }
            Err(e) => {
                error!(job_id, user_id = job.user_id, error = %e, "Export failed");
                repo.mark_error(job_id, &e.to_string(), &to_db(&Utc::now()))
                    .await?;
            }
        }

        repo.get_by_id(job_id).await
    }

    async fn build(&self, job: &ExportJob) -> Result<()> {
        let started = Utc::now();
        let entries = gather_user_data(&self.db, job.user_id, &to_db(&started)).await?;

        let path = self
            .settings
            .exports_dir
            .join(format!("export-{}-{}.zip", job.user_id, job.id));
        let size = write_archive_blocking(path.clone(), entries).await?;

        let now = Utc::now();
        let expires_at = to_db(&(now + self.settings.link_ttl));
        let token = generate_token();
        let now_str = to_db(&now);

        ExportJobRepository::new(self.db.pool())
            .mark_done(
                job.id,
                &token,
                &expires_at,
                &path.to_string_lossy(),
                i64::try_from(size).unwrap_or(i64::MAX),
                &now_str,
            )
            .await?;

        let mut conn = self.db.pool().acquire().await?;
        let note = NewNotification::export_ready(job.user_id);
        if let Err(e) = NotificationRepository::create(&mut conn, &note, &now_str).await {
            warn!(user_id = job.user_id, error = %e, "Could not store export notification");
        }
        Ok(())
    }
}

/// Random hex download token.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::export::ExportStatus;
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

    #[test]
    fn test_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_run_produces_archive_and_token() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("run@example.com", "Run"))
            .await
            .unwrap();
        let job = ExportJobRepository::new(db.pool())
            .create(user.id, "gdpr", &to_db(&Utc::now()))
            .await
            .unwrap();

        let runner = ExportRunner::new(db.clone(), settings(&dir));
        let done = runner.run(job.id).await.unwrap().unwrap();

        assert_eq!(done.status, ExportStatus::Done);
        assert!(done.download_available(Utc::now()));
        let path = std::path::PathBuf::from(done.file_path.unwrap());
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::metadata(&path).unwrap().len() as i64, done.file_size.unwrap());

        let mut conn = db.pool().acquire().await.unwrap();
        let notes = NotificationRepository::list_for_user(&mut conn, user.id, false)
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, "export_ready");
    }

    #[tokio::test]
    async fn test_run_records_failure() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("fail@example.com", "Fail"))
            .await
            .unwrap();
        let job = ExportJobRepository::new(db.pool())
            .create(user.id, "gdpr", &to_db(&Utc::now()))
            .await
            .unwrap();

        // A plain file where the exports directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"x").unwrap();
        let mut s = settings(&dir);
        s.exports_dir = blocker;

        let failed = ExportRunner::new(db, s).run(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ExportStatus::Error);
        assert!(failed.error.is_some());
        assert!(failed.token.is_none());
    }

    #[tokio::test]
    async fn test_run_skips_non_pending() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("skip@example.com", "Skip"))
            .await
            .unwrap();
        let repo = ExportJobRepository::new(db.pool());
        let job = repo.create(user.id, "gdpr", &to_db(&Utc::now())).await.unwrap();
        repo.mark_error(job.id, "earlier", &to_db(&Utc::now())).await.unwrap();

        let after = ExportRunner::new(db.clone(), settings(&dir))
            .run(job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, ExportStatus::Error);
        assert_eq!(after.error.as_deref(), Some("earlier"));
    }
}
