//! JWT authentication.
//!
//! Every request carries its own identity in the bearer token; handlers get
//! it through the [`AuthUser`] and [`AdminUser`] extractors.

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Role;
use crate::mail::Actor;
use crate::web::error::ApiError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: i64,
    /// `user` or `admin`.
    pub role: String,
    pub iat: u64,
    pub exp: u64,
    /// JWT ID (unique identifier).
    pub jti: String,
}

impl JwtClaims {
    /// Admin access is granted by the role claim alone, matched exactly.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }

    /// The caller as a lifecycle actor on the customer API.
    pub fn actor(&self) -> Actor {
        Actor::User(self.sub)
    }
}

/// Decoding side of the JWT configuration.
#[derive(Clone)]
pub struct JwtState {
    pub decoding_key: DecodingKey,
    pub validation: Validation,
}

impl JwtState {
    pub fn new(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        Self {
            decoding_key,
            validation,
        }
    }

    fn verify(&self, token: &str) -> Result<JwtClaims, ApiError> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                ApiError::unauthorized("Invalid or expired token")
            })
    }
}

/// Extractor for authenticated users.
#[derive(Debug, Clone)]
pub struct AuthUser(pub JwtClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

        let jwt_state = parts
            .extensions
            .get::<Arc<JwtState>>()
            .ok_or_else(|| ApiError::internal("JWT state not configured"))?;

        Ok(AuthUser(jwt_state.verify(token)?))
    }
}

/// Extractor for operators (`role == "admin"`).
#[derive(Debug, Clone)]
pub struct AdminUser(pub JwtClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            tracing::warn!(user_id = claims.sub, "Non-admin attempted admin route");
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(claims))
    }
}

/// Middleware function to inject JWT state into request extensions.
pub async fn jwt_auth(
    jwt_state: Arc<JwtState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(jwt_state);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn claims(role: &str, exp_offset: i64) -> JwtClaims {
        let now = chrono::Utc::now().timestamp();
        JwtClaims {
            sub: 7,
            role: role.to_string(),
            iat: now as u64,
            exp: (now + exp_offset) as u64,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn token(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_roundtrip() {
        let state = JwtState::new("test-secret");
        let decoded = state.verify(&token("test-secret", &claims("user", 3600))).unwrap();
        assert_eq!(decoded.sub, 7);
        assert!(!decoded.is_admin());
        assert_eq!(decoded.actor(), Actor::User(7));
    }

    #[test]
    fn test_expired_token() {
        let state = JwtState::new("test-secret");
        assert!(state.verify(&token("test-secret", &claims("user", -3600))).is_err());
    }

    #[test]
    fn test_invalid_secret() {
        let state = JwtState::new("secret2");
        assert!(state.verify(&token("secret1", &claims("user", 3600))).is_err());
    }

    #[test]
    fn test_admin_only_by_role() {
        assert!(claims("admin", 60).is_admin());
        assert!(!claims("ADMIN", 60).is_admin());
        assert!(!claims(" admin", 60).is_admin());
        assert!(!claims("user", 60).is_admin());
        assert!(!claims("operator", 60).is_admin());
    }
}
