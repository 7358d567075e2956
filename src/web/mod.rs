//! HTTP API.
//!
//! Customer and admin REST routes behind bearer JWTs, provider webhooks
//! authenticated by their own credentials, and the export download link.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
