//! Local credentials: Argon2id password hashes and HS256 session tokens.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cookie carrying the local JWT.
pub const SESSION_COOKIE: &str = "lethashop_session";
/// Cookie carrying the users-service session token, kept so logout can revoke it.
pub const UPSTREAM_SESSION_COOKIE: &str = "lethashop_upstream_session";
const UPSTREAM_SESSION_TTL_DAYS: i64 = 60;
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366 * 10;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Hash(#[from] lethashop_core::CoreError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDelta,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, ttl_hours: u64) -> Self {
        let hours = i64::try_from(ttl_hours)
            .unwrap_or(MAX_TOKEN_TTL_HOURS)
            .min(MAX_TOKEN_TTL_HOURS);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: TimeDelta::hours(hours),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// # Errors
    ///
    /// Returns [`AuthError::Token`] if encoding fails.
    pub fn issue(&self, user_id: Uuid, role: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role: role.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verifies signature and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Token`] for malformed, forged or expired tokens.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Hashes a password with Argon2id on the blocking pool.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if hashing fails.
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    let hash =
        tokio::task::spawn_blocking(move || lethashop_core::hash_password(&password)).await??;
    Ok(hash)
}

/// Checks a password against a stored PHC string on the blocking pool.
///
/// # Errors
///
/// Returns [`AuthError::Join`] if the blocking task panics.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, AuthError> {
    let matched = tokio::task::spawn_blocking(move || {
        lethashop_core::verify_password(&password, &stored_hash)
    })
    .await?;
    Ok(matched)
}

fn base_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .same_site(SameSite::None)
        .secure(true)
        .build()
}

pub fn session_cookie(token: String, ttl: TimeDelta) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, token);
    cookie.set_max_age(time::Duration::seconds(ttl.num_seconds()));
    cookie
}

pub fn upstream_session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = base_cookie(UPSTREAM_SESSION_COOKIE, token);
    cookie.set_max_age(time::Duration::days(UPSTREAM_SESSION_TTL_DAYS));
    cookie
}

/// A cookie that tells the browser to drop `name`.
pub fn cleared_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new());
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let tokens = TokenService::new(SECRET, 168);
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "admin").expect("issue");

        let claims = tokens.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 168 * 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = TokenService::new(SECRET, 1);
        let verifier = TokenService::new("ffffffffffffffffffffffffffffffff", 1);
        let token = issuer.issue(Uuid::new_v4(), "user").expect("issue");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new(SECRET, 1);
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: "user".to_owned(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode");
        assert!(tokens.verify(&token).is_err());
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("kiondo-2026".to_owned()).await.expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("kiondo-2026".to_owned(), hash.clone())
            .await
            .expect("verify"));
        assert!(!verify_password("wrong".to_owned(), hash).await.expect("verify"));
    }

    #[tokio::test]
    async fn garbage_hash_never_matches() {
        assert!(!verify_password("x".to_owned(), "not-a-phc-string".to_owned())
            .await
            .expect("verify"));
    }

    #[test]
    fn session_cookie_is_http_only_and_cross_site() {
        let cookie = session_cookie("jwt".to_owned(), TimeDelta::hours(2));
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(2)));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = cleared_cookie(UPSTREAM_SESSION_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
