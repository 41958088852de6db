//! Authentication service.
//!
//! Password registration and login, plus JWT session rotation. Refresh
//! tokens are single-use: presenting one revokes its `jti`.

mod error;
pub mod password;
pub mod tokens;

pub use error::AuthError;
pub use tokens::{Claims, TokenKeys, TokenPair, TokenType};

use sqlx::PgPool;
use tracing::{info, instrument};

use greens_core::{Email, Username};

use self::password::{hash_password, validate_password, verify_password};
use crate::cache::CacheStore;
use crate::db::RepositoryError;
use crate::db::users::{EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, UserRepository};
use crate::models::user::User;

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    cache: &'a CacheStore,
    keys: &'a TokenKeys,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a CacheStore, keys: &'a TokenKeys) -> Self {
        Self {
            users: UserRepository::new(pool),
            cache,
            keys,
        }
    }

    /// Register a new user with email, username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `InvalidUsername` or `WeakPassword`
    /// for bad input, and `DuplicateEmail`/`DuplicateUsername` on conflicts.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let username = Username::parse(username)?;
        validate_password(password)?;

        // A taken email wins over a taken username.
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(&email, &username, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(c) if c == EMAIL_CONSTRAINT => AuthError::DuplicateEmail,
                RepositoryError::Conflict(c) if c == USERNAME_CONSTRAINT => {
                    AuthError::DuplicateUsername
                }
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with an email or username and a password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the identifier is unknown or
    /// the password is wrong, `AccountInactive` for a disabled account.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let identifier = identifier.trim();
        let user = if identifier.contains('@') {
            match Email::parse(identifier) {
                Ok(email) => self.users.get_by_email(&email).await?,
                Err(_) => None,
            }
        } else {
            self.users.get_by_username(identifier).await?
        };

        let user = user.ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &user.password_hash)?;

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        self.users.record_login(user.id).await?;
        let pair = self.keys.issue_pair(user.id)?;

        info!(user_id = %user.id, "User logged in");
        Ok((user, pair))
    }

    /// Exchange a refresh token for a new pair, revoking the presented one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidOrExpiredToken` if the token fails
    /// verification, was already used, or its user is gone or inactive.
    /// Returns `AuthError::SessionStore` if revocation cannot be checked.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.keys.verify(refresh_token, TokenType::Refresh)?;

        if !self.revoke(&claims).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .users
            .get_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        self.keys.issue_pair(user.id)
    }

    /// Revoke a refresh token. Unknown, expired or already revoked tokens are
    /// accepted silently.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionStore` if the revocation cannot be stored.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = match self.keys.verify(refresh_token, TokenType::Refresh) {
            Ok(claims) => claims,
            Err(AuthError::InvalidOrExpiredToken) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.revoke(&claims).await?;
        Ok(())
    }

    /// Blacklist `claims.jti` until the token would expire anyway.
    /// Returns `false` if it was already revoked.
    async fn revoke(&self, claims: &Claims) -> Result<bool, AuthError> {
        let key = self.cache.key(&format!("revoked:{}", claims.jti));
        Ok(self.cache.set_nx_ex(&key, "1", claims.remaining()).await?)
    }
}
