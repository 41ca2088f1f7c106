use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{AccessProfile, Claims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signing and verification keys. Access and refresh tokens use separate
/// secrets so one can never be replayed as the other.
#[derive(Clone)]
pub struct JwtKeys {
    access: Arc<KeyPair>,
    refresh: Arc<KeyPair>,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.keys().clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: Arc::new(KeyPair::from_secret(&cfg.access_secret)),
            refresh: Arc::new(KeyPair::from_secret(&cfg.refresh_secret)),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn pair(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        profile: Option<&AccessProfile>,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            email: profile.map(|p| p.email.clone()),
            username: profile.map(|p| p.username.clone()),
            full_name: profile.map(|p| p.full_name.clone()),
        };
        let token = encode(&Header::default(), &claims, &self.pair(kind).encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, profile: &AccessProfile) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access, Some(profile))
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh, None)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.pair(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("expected {:?} token", kind);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(access: &str, refresh: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            access_secret: access.into(),
            refresh_secret: refresh.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn profile() -> AccessProfile {
        AccessProfile {
            email: "alice@example.com".into(),
            username: "alice".into(),
            full_name: "Alice Liddell".into(),
        }
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("a-secret", "r-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id, &profile()).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.full_name.as_deref(), Some("Alice Liddell"));
    }

    #[test]
    fn refresh_token_carries_only_identity() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert!(claims.email.is_none());
        assert!(claims.username.is_none());
    }

    #[test]
    fn tokens_minted_back_to_back_differ() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let a = keys.sign_refresh(user_id).unwrap();
        let b = keys.sign_refresh(user_id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_refresh_rejects_access_token() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let token = keys.sign_access(Uuid::new_v4(), &profile()).unwrap();
        assert!(keys.verify_refresh(&token).is_err());
    }

    #[test]
    fn kind_is_checked_even_with_shared_secret() {
        let keys = make_keys("same", "same", "iss", "aud");
        let token = keys.sign_access(Uuid::new_v4(), &profile()).unwrap();
        let err = keys.verify_refresh(&token).unwrap_err();
        assert!(err.to_string().contains("Refresh"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("s", "r", "good-iss", "good-aud");
        let bad = make_keys("s", "r", "bad-iss", "bad-aud");
        let token = good.sign_refresh(Uuid::new_v4()).unwrap();
        assert!(bad.verify_refresh(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
            iss: "iss".into(),
            aud: "aud".into(),
            kind: TokenKind::Refresh,
            email: None,
            username: None,
            full_name: None,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"r-secret")).unwrap();
        assert!(keys.verify_refresh(&token).is_err());
    }
}
