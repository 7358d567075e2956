//! Zip archive writer for exports.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::gather::ExportEntry;
use crate::{PostboxError, Result};

/// Write `entries` to `path` as a deflated zip and return its size in bytes.
///
/// The archive is written next to `path` with a `.partial` suffix and renamed
/// into place, so a reader never sees a half-written file.
pub fn write_archive(path: &Path, entries: &[ExportEntry]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    let result = write_zip(&partial, entries);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }

    std::fs::rename(&partial, path)?;
    Ok(std::fs::metadata(path)?.len())
}

/// Async wrapper running the blocking write on tokio's blocking pool.
pub async fn write_archive_blocking(path: PathBuf, entries: Vec<ExportEntry>) -> Result<u64> {
    tokio::task::spawn_blocking(move || write_archive(&path, &entries))
        .await
        .map_err(|e| PostboxError::Archive(format!("archive task failed: {e}")))?
}

fn write_zip(path: &Path, entries: &[ExportEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o600);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&entry.contents)?;
    }

    zip.finish()?.sync_all()?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
