//! Stored scan files.
//!
//! Scans live in the cloud drive; this module only tracks their metadata,
//! keyed by the provider's item id.

mod metadata;

pub use metadata::{FileRepository, NewFile, StoredFile};

/// Maximum length for a stored file name (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;
