//! Common test utilities for integration tests.

#![allow(dead_code)]

use axum_test::TestServer;
use base64::Engine;
use std::sync::Arc;
use tempfile::TempDir;

use postbox::web::handlers::AppState;
use postbox::web::middleware::JwtState;
use postbox::web::router::create_router;
use postbox::{Config, Database, NewUser, Role, User, UserRepository};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const POSTMARK_USER: &str = "postmark";
pub const POSTMARK_PASS: &str = "postmark-pass";
pub const SUMSUB_SECRET: &str = "sumsub-secret";
pub const GOCARDLESS_SECRET: &str = "gc-secret";
pub const ONEDRIVE_SECRET: &str = "onedrive-secret";

/// A running API backed by an in-memory database.
pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<Database>,
    pub state: Arc<AppState>,
    pub data_dir: TempDir,
}

pub fn test_config(data_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.jwt_secret = JWT_SECRET.to_string();
    config.server.public_url = "http://postbox.test".to_string();
    config.storage.data_dir = data_dir.path().to_string_lossy().to_string();
    config.webhooks.postmark_user = POSTMARK_USER.to_string();
    config.webhooks.postmark_pass = POSTMARK_PASS.to_string();
    config.webhooks.sumsub_secret = SUMSUB_SECRET.to_string();
    config.webhooks.gocardless_secret = GOCARDLESS_SECRET.to_string();
    config.webhooks.onedrive_secret = ONEDRIVE_SECRET.to_string();
    config
}

pub async fn create_test_app() -> TestApp {
    let data_dir = TempDir::new().unwrap();
    let config = test_config(&data_dir);
    let db = Arc::new(Database::open_in_memory().await.unwrap());

    let state = Arc::new(AppState::new(db.clone(), &config));
    let jwt_state = Arc::new(JwtState::new(JWT_SECRET));
    let router = create_router(state.clone(), jwt_state, &[]);

    TestApp {
        server: TestServer::new(router).unwrap(),
        db,
        state,
        data_dir,
    }
}

impl TestApp {
    /// Create an account and mint an access token for it.
    pub async fn create_user(&self, email: &str, role: Role) -> (User, String) {
        let user = UserRepository::new(self.db.pool())
            .create(&NewUser::new(email, "Test User").with_role(role))
            .await
            .unwrap();
        let token = self.state.generate_access_token(user.id, role).unwrap();
        (user, token)
    }

    pub async fn get_user(&self, id: i64) -> User {
        UserRepository::new(self.db.pool())
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn basic(user: &str, pass: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
    format!("Basic {}", encoded)
}

pub fn sign(secret: &str, body: &str) -> String {
    postbox::webhooks::signature::hmac_sha256_hex(secret, body.as_bytes())
}
