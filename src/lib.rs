//! postbox - virtual mailbox backend
//!
//! Tracks scanned letters through a forwarding lifecycle, produces GDPR data
//! exports and applies provider webhooks (email, KYC, payments and scan
//! storage) to account state.

pub mod billing;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod export;
pub mod file;
pub mod logging;
pub mod mail;
pub mod notification;
pub mod web;
pub mod webhooks;

pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository, UserUpdate};
pub use error::{PostboxError, Result};
pub use export::{cleanup_expired, CleanupReport, ExportService, ExportSettings};
pub use mail::{Actor, Lifecycle, MailAction, MailService, TransitionError};
pub use web::WebServer;
