use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{claims::AccessProfile, jwt::JwtKeys};
use crate::{
    error::AppError,
    users::{repo::UserRepo, repo_types::User},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues, verifies, rotates and revokes access/refresh tokens. Each user has
/// at most one live refresh token, stored on the user record.
#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    users: Arc<dyn UserRepo>,
}

impl TokenService {
    pub fn new(keys: JwtKeys, users: Arc<dyn UserRepo>) -> Self {
        Self { keys, users }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn mint(&self, user: &User) -> Result<TokenPair, AppError> {
        let profile = AccessProfile {
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
        };
        Ok(TokenPair {
            access_token: self.keys.sign_access(user.id, &profile)?,
            refresh_token: self.keys.sign_refresh(user.id)?,
        })
    }

    /// Mints a fresh pair and overwrites the persisted refresh token.
    #[instrument(skip(self))]
    pub async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} vanished while issuing tokens", user_id))?;
        let pair = self.mint(&user)?;
        self.users
            .set_refresh_token(user.id, Some(&pair.refresh_token))
            .await?;
        info!(%user_id, "token pair issued");
        Ok(pair)
    }

    pub fn verify_refresh(&self, token: Option<&str>) -> Result<Uuid, AppError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;
        let claims = self.keys.verify_refresh(token).map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AppError::InvalidToken
        })?;
        Ok(claims.sub)
    }

    /// Exchanges the current refresh token for a new pair. A token that is not
    /// the one currently persisted (superseded, revoked, or raced) is refused.
    #[instrument(skip_all)]
    pub async fn rotate(&self, incoming: Option<&str>) -> Result<TokenPair, AppError> {
        let user_id = self.verify_refresh(incoming)?;
        let incoming = incoming.map(str::trim).unwrap_or_default();

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

        if user.refresh_token.as_deref() != Some(incoming) {
            warn!(%user_id, "stale refresh token presented");
            return Err(AppError::TokenExpiredOrReused);
        }

        let pair = self.mint(&user)?;
        let swapped = self
            .users
            .swap_refresh_token(user.id, incoming, &pair.refresh_token)
            .await?;
        if !swapped {
            warn!(%user_id, "refresh token rotated concurrently");
            return Err(AppError::TokenExpiredOrReused);
        }

        info!(%user_id, "refresh token rotated");
        Ok(pair)
    }

    pub async fn revoke(&self, user_id: Uuid) -> Result<(), AppError> {
        self.users.set_refresh_token(user_id, None).await?;
        info!(%user_id, "refresh token revoked");
        Ok(())
    }
}
