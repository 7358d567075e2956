//! Transport authorization for provider callbacks.

use std::net::IpAddr;

use axum::http::HeaderMap;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    match <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Verify a hex HMAC-SHA256 signature over the raw body.
///
/// A leading `sha256=` on the header value is accepted.
pub fn verify_hmac_hex(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::NotConfigured);
    }
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::MissingSignature)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let expected = hex::decode(signature)
        .map_err(|e| WebhookError::InvalidSignatureFormat(e.to_string()))?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::NotConfigured)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Read a header as a string.
pub fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check HTTP Basic credentials in constant time.
pub fn verify_basic_auth(
    headers: &HeaderMap,
    expected_user: &str,
    expected_pass: &str,
) -> Result<(), WebhookError> {
    if expected_user.is_empty() || expected_pass.is_empty() {
        return Err(WebhookError::NotConfigured);
    }
    let auth = headers
        .typed_get::<Authorization<Basic>>()
        .ok_or(WebhookError::InvalidCredentials)?;

    let user_ok = constant_time_str_eq(auth.username(), expected_user);
    let pass_ok = constant_time_str_eq(auth.password(), expected_pass);
    if user_ok & pass_ok {
        Ok(())
    } else {
        Err(WebhookError::InvalidCredentials)
    }
}

/// Check the caller against an allowlist. An empty list allows everyone.
///
/// The socket peer is the caller unless it is one of `trusted_proxies`; then
/// `X-Forwarded-For` is walked right to left and the first hop that is not a
/// trusted proxy is the caller.
pub fn verify_ip_allowlist(
    allowed: &[String],
    trusted_proxies: &[String],
    headers: &HeaderMap,
    peer: Option<IpAddr>,
) -> Result<(), WebhookError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let peer = peer.ok_or_else(|| WebhookError::AddressNotAllowed("unknown".to_string()))?;
    let trusted = parse_ips(trusted_proxies);
    let caller = if trusted.contains(&peer) {
        forwarded_client(headers, &trusted)?.unwrap_or(peer)
    } else {
        peer
    };

    if parse_ips(allowed).contains(&caller) {
        Ok(())
    } else {
        Err(WebhookError::AddressNotAllowed(caller.to_string()))
    }
}

/// Right-most `X-Forwarded-For` hop that is not a trusted proxy.
fn forwarded_client(
    headers: &HeaderMap,
    trusted: &[IpAddr],
) -> Result<Option<IpAddr>, WebhookError> {
    let Some(value) = header_str(headers, "x-forwarded-for") else {
        return Ok(None);
    };
    for hop in value.rsplit(',').map(str::trim).filter(|h| !h.is_empty()) {
        let ip = hop
            .parse::<IpAddr>()
            .map_err(|_| WebhookError::AddressNotAllowed(hop.to_string()))?;
        if !trusted.contains(&ip) {
            return Ok(Some(ip));
        }
    }
    Ok(None)
}

fn parse_ips(list: &[String]) -> Vec<IpAddr> {
    list.iter()
        .filter_map(|a| a.trim().parse::<IpAddr>().ok())
        .collect()
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
