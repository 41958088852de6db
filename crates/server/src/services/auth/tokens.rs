//! HS256 access/refresh tokens.
//!
//! Access tokens are verified from the signature and expiry alone. Refresh
//! tokens additionally carry a `jti` that can be revoked in the cache store.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greens_core::UserId;

use super::AuthError;
use crate::config::JwtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Registered claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Encoded as a string, as registered `sub` claims must be.
    #[serde(with = "subject")]
    pub sub: UserId,
    pub jti: String,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

mod subject {
    use greens_core::UserId;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &UserId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserId, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<i32>().map(UserId::new).map_err(D::Error::custom)
    }
}

impl Claims {
    /// Seconds until expiry, floored at zero.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        let secs = self.exp.saturating_sub(Utc::now().timestamp());
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Signing material and lifetimes, built once at startup.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Issue a fresh access/refresh pair for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenEncoding` if signing fails.
    pub fn issue_pair(&self, user: UserId) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(user, TokenType::Access)?,
            refresh_token: self.issue(user, TokenType::Refresh)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.as_secs(),
        })
    }

    fn issue(&self, user: UserId, typ: TokenType) -> Result<String, AuthError> {
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: user,
            jti: Uuid::new_v4().to_string(),
            typ,
            iat,
            exp: iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| AuthError::TokenEncoding)
    }

    /// Verify signature, expiry and token type.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidOrExpiredToken` on any verification failure.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        if data.claims.typ != expected {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn keys(secret: &str, access_ttl: Duration) -> TokenKeys {
        TokenKeys::new(&JwtConfig {
            secret: SecretString::from(secret.to_string()),
            access_ttl,
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        })
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_issue_and_verify_access() {
        let keys = keys(SECRET, Duration::from_secs(3600));
        let pair = keys.issue_pair(UserId::new(42)).unwrap();

        let claims = keys.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, UserId::new(42));
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(pair.expires_in, 3600);
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let keys = keys(SECRET, Duration::from_secs(3600));
        let pair = keys.issue_pair(UserId::new(1)).unwrap();

        assert!(keys.verify(&pair.refresh_token, TokenType::Access).is_err());
        assert!(keys.verify(&pair.access_token, TokenType::Refresh).is_err());
        assert!(keys.verify(&pair.refresh_token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn test_jti_is_unique_per_token() {
        let keys = keys(SECRET, Duration::from_secs(3600));
        let pair = keys.issue_pair(UserId::new(1)).unwrap();

        let access = keys.verify(&pair.access_token, TokenType::Access).unwrap();
        let refresh = keys.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn test_subject_is_a_string_claim() {
        let keys = keys(SECRET, Duration::from_secs(3600));
        let pair = keys.issue_pair(UserId::new(7)).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        let raw = decode::<serde_json::Value>(
            &pair.access_token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap();
        assert_eq!(raw.claims["sub"], "7");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = keys(SECRET, Duration::from_secs(3600));
        let other = keys("fedcba9876543210fedcba9876543210", Duration::from_secs(3600));
        let pair = issuer.issue_pair(UserId::new(1)).unwrap();

        assert!(matches!(
            other.verify(&pair.access_token, TokenType::Access),
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = keys(SECRET, Duration::ZERO);
        let pair = keys.issue_pair(UserId::new(1)).unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        assert!(keys.verify(&pair.access_token, TokenType::Access).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let keys = keys(SECRET, Duration::from_secs(3600));
        assert!(keys.verify("not.a.jwt", TokenType::Access).is_err());
    }
}
