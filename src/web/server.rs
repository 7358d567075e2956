//! HTTP server and background maintenance.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::export::cleanup_expired;
use crate::{Database, PostboxError, Result};

use super::handlers::AppState;
use super::middleware::JwtState;
use super::router::{create_health_router, create_router};

/// Web server for the API.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: Vec<String>,
    cleanup_interval: Duration,
}

impl WebServer {
    pub fn new(config: &Config, db: Arc<Database>) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| PostboxError::Config(format!("invalid listen address: {e}")))?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(db, config)),
            jwt_state: Arc::new(JwtState::new(&config.server.jwt_secret)),
            cors_origins: config.server.cors_origins.clone(),
            cleanup_interval: Duration::from_secs(config.export.cleanup_interval_secs.max(1)),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, e.g. for minting tokens.
    pub fn state(&self) -> Arc<AppState> {
        self.app_state.clone()
    }

    /// The complete application router.
    pub fn router(&self) -> Router {
        create_router(
            self.app_state.clone(),
            self.jwt_state.clone(),
            &self.cors_origins,
        )
        .merge(create_health_router())
    }

    /// Sweep expired export archives on an interval.
    ///
    /// Every instance runs this; the advisory lock inside the sweep keeps
    /// them from overlapping.
    fn start_export_cleanup_task(state: Arc<AppState>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                let report =
                    cleanup_expired(&state.db, state.exports.settings(), &state.instance_id).await;
                if report.locked_out {
                    tracing::debug!("Export cleanup skipped: another instance holds the lock");
                } else if report.cleaned == 0 {
                    tracing::debug!("No expired exports to clean up");
                }
            }
        });
    }

    async fn bind(self) -> std::io::Result<(TcpListener, Router, SocketAddr)> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        Self::start_export_cleanup_task(self.app_state.clone(), self.cleanup_interval);
        tracing::info!(
            every_secs = self.cleanup_interval.as_secs(),
            "Export cleanup task started"
        );
        tracing::info!("Web server listening on http://{}", local_addr);
        Ok((listener, router, local_addr))
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router, _) = self.bind().await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Useful for tests binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router, local_addr) = self.bind().await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });
        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.jwt_secret = "test-secret-key".to_string();
        config
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let server = WebServer::new(&test_config(), db).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let mut config = test_config();
        config.server.host = "not an address".to_string();
        assert!(matches!(
            WebServer::new(&config, db),
            Err(PostboxError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_with_addr_serves_health() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let addr = WebServer::new(&test_config(), db)
            .unwrap()
            .run_with_addr()
            .await
            .unwrap();
        assert_ne!(addr.port(), 0);

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
