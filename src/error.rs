//! Error types for postbox.

use thiserror::Error;

use crate::mail::TransitionError;

/// Common error type for postbox.
#[derive(Error, Debug)]
pub enum PostboxError {
    /// Database error.
    ///
    /// Wraps errors from any database backend. Errors from sqlx are
    /// converted automatically; missing tables are split out into
    /// [`PostboxError::MissingTable`].
    #[error("database error: {0}")]
    Database(String),

    /// A table the query needs does not exist (partially migrated schema).
    #[error("missing table: {0}")]
    MissingTable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Resource existed but is no longer available.
    #[error("{0} has expired")]
    Expired(String),

    /// Mail item lifecycle transition was rejected.
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// Export archive could not be written.
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PostboxError {
    /// Whether this error comes from a table that has not been migrated yet.
    pub fn is_missing_table(&self) -> bool {
        matches!(self, PostboxError::MissingTable(_))
    }
}

impl From<sqlx::Error> for PostboxError {
    fn from(e: sqlx::Error) -> Self {
        if is_missing_table_error(&e) {
            PostboxError::MissingTable(e.to_string())
        } else {
            PostboxError::Database(e.to_string())
        }
    }
}

impl From<zip::result::ZipError> for PostboxError {
    fn from(e: zip::result::ZipError) -> Self {
        PostboxError::Archive(e.to_string())
    }
}

impl From<serde_json::Error> for PostboxError {
    fn from(e: serde_json::Error) -> Self {
        PostboxError::Archive(e.to_string())
    }
}

/// PostgreSQL reports `42P01` (undefined_table); SQLite only has the message.
fn is_missing_table_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("42P01")
                || db_err.message().contains("no such table")
        }
        _ => false,
    }
}

/// Result type alias for postbox operations.
pub type Result<T> = std::result::Result<T, PostboxError>;
