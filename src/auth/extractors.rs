use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;
use uuid::Uuid;

use super::{handlers::ACCESS_COOKIE, jwt::JwtKeys};
use crate::error::AppError;

/// Authenticated caller, from `Authorization: Bearer` or the access cookie.
pub struct AuthUser(pub Uuid);

/// Like [`AuthUser`] but anonymous callers (no token at all) pass through.
/// A token that is present but invalid is still rejected.
pub struct MaybeAuthUser(pub Option<Uuid>);

/// Bearer token from the `Authorization` header, else the access cookie.
fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
}

fn verify(keys: &JwtKeys, token: &str) -> Result<Uuid, AppError> {
    keys.verify_access(token).map(|c| c.sub).map_err(|e| {
        warn!(error = %e, "invalid or expired access token");
        AppError::Unauthorized("Invalid or expired access token".into())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = bearer_token(parts)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;
        Ok(AuthUser(verify(&keys, &token)?))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        match bearer_token(parts).filter(|t| !t.is_empty()) {
            Some(token) => Ok(MaybeAuthUser(Some(verify(&keys, &token)?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
