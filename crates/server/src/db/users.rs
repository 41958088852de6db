//! User repository for database operations.

use sqlx::PgPool;
use tracing::instrument;

use greens_core::{Email, UserId, Username};

use super::{RepositoryError, map_unique};
use crate::models::user::{ProfileUpdate, User};

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, bio, \
     avatar_url, phone, location, verification_tier, reputation_score, is_active, \
     last_login_at, last_active_at, created_at, updated_at";

/// Unique index on `email`.
pub const EMAIL_CONSTRAINT: &str = "user_email_key";
/// Unique index on `lower(username)`.
pub const USERNAME_CONSTRAINT: &str = "user_username_lower_key";

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM marketplace.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by their (normalized) email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM marketplace.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by username, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM marketplace.user WHERE lower(username) = lower($1)"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` carrying the violated constraint name
    /// ([`EMAIL_CONSTRAINT`] or [`USERNAME_CONSTRAINT`]) on a duplicate.
    #[instrument(skip(self, password_hash), fields(email = %email))]
    pub async fn create(
        &self,
        email: &Email,
        username: &Username,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO marketplace.user (email, username, password_hash) \
             VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(username.as_str())
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(map_unique)?;

        Ok(user)
    }

    /// Stamp a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn record_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE marketplace.user \
             SET last_login_at = NOW(), last_active_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Apply a partial profile update and return the updated user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE marketplace.user SET \
                 first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 bio = COALESCE($4, bio), \
                 avatar_url = COALESCE($5, avatar_url), \
                 phone = COALESCE($6, phone), \
                 location = COALESCE($7, location), \
                 last_active_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.bio.as_deref())
        .bind(update.avatar_url.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.location.as_deref())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
