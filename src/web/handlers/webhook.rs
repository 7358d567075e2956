//! Provider webhook endpoints.
//!
//! Handlers take the raw body so signatures are checked over the exact bytes
//! the provider signed. Only authorization failures produce a non-200.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::web::handlers::AppState;
use crate::webhooks::{self, Provider, WebhookAck, WebhookError};

async fn handle(
    state: &AppState,
    provider: Provider,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let peer_ip = peer.map(|ConnectInfo(addr)| addr.ip());
    webhooks::authorize(provider, &state.webhooks, headers, peer_ip, body)?;
    Ok(Json(
        webhooks::ingest(&state.db, &state.lifecycle, provider, body).await,
    ))
}

/// POST /api/webhooks/postmark
pub async fn postmark_webhook(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    handle(&state, Provider::Postmark, peer, &headers, &body).await
}

/// POST /api/webhooks/sumsub
pub async fn sumsub_webhook(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    handle(&state, Provider::Sumsub, peer, &headers, &body).await
}

/// POST /api/webhooks/gc
pub async fn gocardless_webhook(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    handle(&state, Provider::GoCardless, peer, &headers, &body).await
}

/// POST /api/webhooks/onedrive
pub async fn onedrive_webhook(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    handle(&state, Provider::OneDrive, peer, &headers, &body).await
}
