//! Configuration module for postbox.

use serde::Deserialize;
use std::path::Path;

use crate::{PostboxError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (the dashboard frontend).
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// JWT secret key used to verify bearer tokens.
    #[serde(default)]
    pub jwt_secret: String,
    /// Access token expiry in seconds.
    #[serde(default = "default_jwt_access_expiry")]
    pub jwt_access_token_expiry_secs: u64,
    /// Public base URL used when building download links.
    #[serde(default)]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_access_expiry() -> u64 {
    900 // 15 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            jwt_secret: String::new(),
            jwt_access_token_expiry_secs: default_jwt_access_expiry(),
            public_url: String::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite:` path or `postgres://` URL).
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite:data/postbox.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Storage paths.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl StorageConfig {
    /// Directory where export archives are written.
    pub fn exports_dir(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join("exports")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/postbox.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// GDPR export configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Hours a download link stays valid after the export finishes.
    #[serde(default = "default_link_ttl_hours")]
    pub link_ttl_hours: i64,
    /// Hours during which a finished export is reused instead of re-run.
    #[serde(default = "default_reuse_window_hours")]
    pub reuse_window_hours: i64,
    /// Interval between cleanup sweeps in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Seconds after which a SQLite maintenance lock is considered stale.
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: i64,
}

fn default_link_ttl_hours() -> i64 {
    24
}

fn default_reuse_window_hours() -> i64 {
    12
}

fn default_cleanup_interval() -> u64 {
    3600 // 1 hour
}

fn default_lock_stale_secs() -> i64 {
    900
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            link_ttl_hours: default_link_ttl_hours(),
            reuse_window_hours: default_reuse_window_hours(),
            cleanup_interval_secs: default_cleanup_interval(),
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

/// Mail forwarding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardingConfig {
    /// Days after arrival during which an item may still be forwarded.
    #[serde(default = "default_forwarding_window")]
    pub window_days: i64,
}

fn default_forwarding_window() -> i64 {
    14
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            window_days: default_forwarding_window(),
        }
    }
}

/// Webhook credentials.
///
/// An empty secret disables the corresponding endpoint (every request is
/// rejected with 401).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhooksConfig {
    /// Basic auth user expected on Postmark callbacks.
    #[serde(default)]
    pub postmark_user: String,
    /// Basic auth password expected on Postmark callbacks.
    #[serde(default)]
    pub postmark_pass: String,
    /// Source IPs allowed to call the Postmark endpoint (empty = any).
    #[serde(default)]
    pub postmark_allowed_ips: Vec<String>,
    /// Reverse proxies whose `X-Forwarded-For` is believed.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Sumsub webhook secret.
    #[serde(default)]
    pub sumsub_secret: String,
    /// GoCardless webhook endpoint secret.
    #[serde(default)]
    pub gocardless_secret: String,
    /// OneDrive scan notification signing secret.
    #[serde(default)]
    pub onedrive_secret: String,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Export configuration.
    #[serde(default)]
    pub export: ExportConfig,
    /// Forwarding configuration.
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    /// Webhook configuration.
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(PostboxError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| PostboxError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `POSTBOX_JWT_SECRET`
    /// - `DATA_DIR`
    /// - `POSTMARK_WEBHOOK_USER`, `POSTMARK_WEBHOOK_PASS`
    /// - `SUMSUB_WEBHOOK_SECRET`, `GOCARDLESS_WEBHOOK_SECRET`, `ONEDRIVE_WEBHOOK_SECRET`
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 7] = [
            ("POSTBOX_JWT_SECRET", &mut self.server.jwt_secret),
            ("DATA_DIR", &mut self.storage.data_dir),
            ("POSTMARK_WEBHOOK_USER", &mut self.webhooks.postmark_user),
            ("POSTMARK_WEBHOOK_PASS", &mut self.webhooks.postmark_pass),
            ("SUMSUB_WEBHOOK_SECRET", &mut self.webhooks.sumsub_secret),
            ("GOCARDLESS_WEBHOOK_SECRET", &mut self.webhooks.gocardless_secret),
            ("ONEDRIVE_WEBHOOK_SECRET", &mut self.webhooks.onedrive_secret),
        ];

        for (var, target) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *target = value;
                }
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the JWT secret is not set or a window is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.server.jwt_secret.is_empty() {
            return Err(PostboxError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via POSTBOX_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.forwarding.window_days <= 0 {
            return Err(PostboxError::Config(
                "forwarding.window_days must be positive".to_string(),
            ));
        }
        if self.export.link_ttl_hours <= 0 {
            return Err(PostboxError::Config(
                "export.link_ttl_hours must be positive".to_string(),
            ));
        }
        if self.export.reuse_window_hours <= 0 {
            return Err(PostboxError::Config(
                "export.reuse_window_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
