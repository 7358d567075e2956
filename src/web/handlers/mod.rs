//! API handlers.

pub mod admin;
pub mod download;
pub mod mail;
pub mod notification;
pub mod profile;
pub mod webhook;

pub use admin::*;
pub use download::*;
pub use mail::*;
pub use notification::*;
pub use profile::*;
pub use webhook::*;

use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};

use crate::config::{Config, WebhooksConfig};
use crate::db::{Database, Role};
use crate::export::{ExportService, ExportSettings};
use crate::mail::{Lifecycle, MailService};
use crate::web::middleware::JwtClaims;

/// Shared state handed to every handler.
pub struct AppState {
    pub db: Arc<Database>,
    /// JWT encoding key.
    pub encoding_key: EncodingKey,
    /// Access token expiry in seconds.
    pub access_token_expiry: u64,
    pub lifecycle: Lifecycle,
    pub exports: ExportService,
    pub webhooks: WebhooksConfig,
    /// Identifies this process as a cleanup lock holder.
    pub instance_id: String,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let exports = ExportService::new(db.clone(), ExportSettings::from_config(config));
        Self {
            db,
            encoding_key: EncodingKey::from_secret(config.server.jwt_secret.as_bytes()),
            access_token_expiry: config.server.jwt_access_token_expiry_secs,
            lifecycle: Lifecycle::new(config.forwarding.window_days),
            exports,
            webhooks: config.webhooks.clone(),
            instance_id: format!("postbox-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Mail lifecycle service bound to this state's database.
    pub fn mail(&self) -> MailService<'_> {
        MailService::new(&self.db, self.lifecycle)
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, user_id: i64, role: Role) -> crate::Result<String> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = JwtClaims {
            sub: user_id,
            role: role.as_str().to_string(),
            iat: now,
            exp: now + self.access_token_expiry,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode JWT: {}", e);
            crate::PostboxError::Auth("failed to generate token".to_string())
        })
    }
}
