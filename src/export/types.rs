//! Export job types.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::datetime::{parse_db, to_rfc3339};

/// Export job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Running => "running",
            ExportStatus::Done => "done",
            ExportStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExportStatus::Pending),
            "running" => Some(ExportStatus::Running),
            "done" => Some(ExportStatus::Done),
            "error" => Some(ExportStatus::Error),
            _ => None,
        }
    }
}

/// Raw `export_jobs` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ExportJobRow {
    pub id: i64,
    pub user_id: i64,
    pub job_type: String,
    pub status: String,
    pub token: Option<String>,
    pub expires_at: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub purged_at: Option<String>,
}

/// One GDPR export request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub id: i64,
    pub user_id: i64,
    pub job_type: String,
    pub status: ExportStatus,
    /// Download credential, set once the archive is written.
    pub token: Option<String>,
    pub expires_at: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// When cleanup removed the archive.
    pub purged_at: Option<String>,
}

impl From<ExportJobRow> for ExportJob {
    fn from(row: ExportJobRow) -> Self {
        ExportJob {
            id: row.id,
            user_id: row.user_id,
            job_type: row.job_type,
            // Unknown values are surfaced as failures rather than as in-flight work.
            status: ExportStatus::parse(&row.status).unwrap_or(ExportStatus::Error),
            token: row.token,
            expires_at: row.expires_at,
            file_path: row.file_path,
            file_size: row.file_size,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            purged_at: row.purged_at,
        }
    }
}

impl ExportJob {
    /// Whether the link has passed its expiry at `now`. Jobs without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .as_deref()
            .and_then(parse_db)
            .is_some_and(|expires| now >= expires)
    }

    /// A download may be offered only for a finished, unexpired, unpurged archive.
    pub fn download_available(&self, now: DateTime<Utc>) -> bool {
        self.status == ExportStatus::Done
            && self.token.is_some()
            && self.purged_at.is_none()
            && self
                .expires_at
                .as_deref()
                .and_then(parse_db)
                .is_some_and(|expires| now < expires)
    }

    /// Client-facing descriptor.
    pub fn view(&self, public_url: &str, now: DateTime<Utc>) -> ExportJobView {
        let download = if self.download_available(now) {
            self.token.as_deref().map(|token| download_url(public_url, token))
        } else {
            None
        };

        ExportJobView {
            id: self.id,
            job_type: self.job_type.clone(),
            status: self.status,
            created_at: to_rfc3339(&self.created_at),
            completed_at: self.completed_at.as_deref().map(to_rfc3339),
            expires_at: self.expires_at.as_deref().map(to_rfc3339),
            file_size: self.file_size,
            error: self.error.clone(),
            download,
        }
    }
}

/// Download link for a token.
pub fn download_url(public_url: &str, token: &str) -> String {
    format!(
        "{}/api/downloads/export/{}",
        public_url.trim_end_matches('/'),
        token
    )
}

/// Export job as returned by the request and status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobView {
    pub id: i64,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: ExportStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub expires_at: Option<String>,
    pub file_size: Option<i64>,
    pub error: Option<String>,
    /// Present only while the archive can be downloaded.
    pub download: Option<String>,
}

/// Settings shared by the export request path, runner and cleanup.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Where archives are written.
    pub exports_dir: PathBuf,
    /// Lifetime of a download link.
    pub link_ttl: Duration,
    /// A finished export this recent is returned instead of starting a new one.
    pub reuse_window: Duration,
    /// Age after which a cleanup lock row is taken over.
    pub lock_stale_secs: i64,
    /// Base URL for download links.
    pub public_url: String,
}

impl ExportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exports_dir: config.storage.exports_dir(),
            link_ttl: Duration::hours(config.export.link_ttl_hours),
            reuse_window: Duration::hours(config.export.reuse_window_hours),
            lock_stale_secs: config.export.lock_stale_secs,
            public_url: config.server.public_url.clone(),
        }
    }
}

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Archives purged.
    pub cleaned: usize,
    /// Another instance held the cleanup lock.
    pub locked_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::to_db;

    fn now() -> DateTime<Utc> {
        "2024-05-01T10:00:00Z".parse().unwrap()
    }

    fn done_job(expires_in: Duration) -> ExportJob {
        ExportJob {
            id: 9,
            user_id: 42,
            job_type: "gdpr".into(),
            status: ExportStatus::Done,
            token: Some("abc".into()),
            expires_at: Some(to_db(&(now() + expires_in))),
            file_path: Some("/tmp/x.zip".into()),
            file_size: Some(10),
            error: None,
            created_at: to_db(&now()),
            started_at: None,
            completed_at: Some(to_db(&now())),
            purged_at: None,
        }
    }

    #[test]
    fn test_download_only_when_done_and_unexpired() {
        let job = done_job(Duration::hours(1));
        assert!(job.download_available(now()));
        assert_eq!(
            job.view("https://app.example.com/", now()).download.as_deref(),
            Some("https://app.example.com/api/downloads/export/abc")
        );

        let expired = done_job(Duration::seconds(0));
        assert!(!expired.download_available(now()));
        assert!(expired.is_expired(now()));
        assert_eq!(expired.view("", now()).download, None);

        let mut running = done_job(Duration::hours(1));
        running.status = ExportStatus::Running;
        assert_eq!(running.view("", now()).download, None);

        let mut purged = done_job(Duration::hours(1));
        purged.purged_at = Some(to_db(&now()));
        assert!(!purged.download_available(now()));
    }

    #[test]
    fn test_view_serialization() {
        let view = done_job(Duration::hours(24)).view("", now());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["type"], "gdpr");
        assert_eq!(json["download"], "/api/downloads/export/abc");
        assert_eq!(json["expiresAt"], "2024-05-02T10:00:00Z");
    }

    #[test]
    fn test_cleanup_report_shape() {
        let json = serde_json::to_value(CleanupReport {
            cleaned: 0,
            locked_out: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"cleaned": 0, "lockedOut": true}));
    }

    #[test]
    fn test_unknown_status_reads_as_error() {
        assert_eq!(ExportStatus::parse("queued"), None);
        assert_eq!(ExportStatus::parse("done"), Some(ExportStatus::Done));
    }
}
