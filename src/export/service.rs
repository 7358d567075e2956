//! Export request, status and download resolution.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::repository::ExportJobRepository;
use super::runner::ExportRunner;
use super::types::{ExportJob, ExportJobView, ExportSettings};
use crate::datetime::to_db;
use crate::db::Database;
use crate::{PostboxError, Result};

/// Only export type currently offered.
pub const GDPR_EXPORT: &str = "gdpr";

/// A resolved download.
#[derive(Debug, Clone)]
pub struct ExportDownload {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

/// Entry point for export requests.
#[derive(Clone)]
pub struct ExportService {
    db: Arc<Database>,
    settings: ExportSettings,
}

impl ExportService {
    pub fn new(db: Arc<Database>, settings: ExportSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Return a reusable job for the user or start a new one.
    ///
    /// The boolean is true when a new job was created and scheduled.
    pub async fn request(&self, user_id: i64) -> Result<(ExportJob, bool)> {
        let repo = ExportJobRepository::new(self.db.pool());
        let now = Utc::now();
        let done_since = to_db(&(now - self.settings.reuse_window));

        if let Some(job) = repo.find_reusable(user_id, GDPR_EXPORT, &done_since).await? {
            info!(user_id, job_id = job.id, status = job.status.as_str(), "Reusing export job");
            return Ok((job, false));
        }

        let job = repo.create(user_id, GDPR_EXPORT, &to_db(&now)).await?;
        info!(user_id, job_id = job.id, "Export job queued");
        ExportRunner::new(self.db.clone(), self.settings.clone()).spawn(job.id);
        Ok((job, true))
    }

    /// Latest job for the user, if any.
    pub async fn status(&self, user_id: i64) -> Result<Option<ExportJobView>> {
        let job = ExportJobRepository::new(self.db.pool())
            .latest_for_user(user_id, GDPR_EXPORT)
            .await?;
        Ok(job.map(|j| self.view(&j)))
    }

    pub fn view(&self, job: &ExportJob) -> ExportJobView {
        job.view(&self.settings.public_url, Utc::now())
    }

    /// Validate a download token and locate the archive.
    pub async fn resolve_download(&self, token: &str) -> Result<ExportDownload> {
        if token.is_empty() {
            return Err(PostboxError::NotFound("export".to_string()));
        }

        let job = ExportJobRepository::new(self.db.pool())
            .get_by_token(token)
            .await?
            .ok_or_else(|| PostboxError::NotFound("export".to_string()))?;

        let now = Utc::now();
        if job.is_expired(now) || job.purged_at.is_some() {
            return Err(PostboxError::Expired("export link".to_string()));
        }
        if !job.download_available(now) {
            return Err(PostboxError::NotFound("export".to_string()));
        }

        let path = job
            .file_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| PostboxError::NotFound("export file".to_string()))?;
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(PostboxError::NotFound("export file".to_string())),
        };

        Ok(ExportDownload {
            path,
            file_name: format!("postbox-export-{}.zip", job.id),
            size,
        })
    }
}
