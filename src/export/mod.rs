//! GDPR data export.
//!
//! A request creates (or reuses) an export job that a background task turns
//! into a zip archive with a time-limited download token. An hourly sweep
//! removes archives whose links have expired.

mod archive;
mod cleanup;
mod gather;
mod repository;
mod runner;
mod service;
mod types;

pub use archive::write_archive;
pub use cleanup::cleanup_expired;
pub use gather::{gather_user_data, ExportEntry};
pub use repository::ExportJobRepository;
pub use runner::ExportRunner;
pub use service::{ExportDownload, ExportService, GDPR_EXPORT};
pub use types::{
    download_url, CleanupReport, ExportJob, ExportJobView, ExportSettings, ExportStatus,
};
