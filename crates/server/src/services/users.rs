//! Profile and preference management for the authenticated user.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use greens_core::{CurrencyCode, UserId};

use crate::db::{PreferencesRepository, RepositoryError, UserRepository};
use crate::error::{DomainError, ErrorKind};
use crate::models::user::{PreferencesUpdate, ProfileUpdate, User, UserPreferences};

const MAX_NAME_LENGTH: usize = 100;
const MAX_BIO_LENGTH: usize = 2000;
const MAX_URL_LENGTH: usize = 500;
const MAX_PHONE_LENGTH: usize = 32;
const THEMES: [&str; 3] = ["light", "dark", "system"];

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for UserError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "USER_NOT_FOUND",
            other => other.kind().code(),
        }
    }
}

pub struct UserService<'a> {
    users: UserRepository<'a>,
    preferences: PreferencesRepository<'a>,
}

impl<'a> UserService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            preferences: PreferencesRepository::new(pool),
        }
    }

    /// # Errors
    ///
    /// Returns `UserError::NotFound` if the account no longer exists.
    pub async fn profile(&self, user: UserId) -> Result<User, UserError> {
        self.users.get_by_id(user).await?.ok_or(UserError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `UserError::Validation` for oversized fields.
    #[instrument(skip(self, update), fields(user_id = %user))]
    pub async fn update_profile(
        &self,
        user: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, UserError> {
        validate_profile(update)?;
        self.users
            .update_profile(user, update)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => UserError::NotFound,
                other => UserError::Repository(other),
            })
    }

    /// # Errors
    ///
    /// Returns `UserError::Repository` if the store fails.
    pub async fn preferences(&self, user: UserId) -> Result<UserPreferences, UserError> {
        Ok(self.preferences.get(user).await?)
    }

    /// # Errors
    ///
    /// Returns `UserError::Validation` for an unknown theme or currency.
    #[instrument(skip(self, update), fields(user_id = %user))]
    pub async fn update_preferences(
        &self,
        user: UserId,
        update: &PreferencesUpdate,
    ) -> Result<UserPreferences, UserError> {
        validate_preferences(update)?;
        Ok(self.preferences.update(user, update).await?)
    }
}

fn check_length(field: &str, value: Option<&String>, max: usize) -> Result<(), UserError> {
    match value {
        Some(v) if v.chars().count() > max => Err(UserError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn validate_profile(update: &ProfileUpdate) -> Result<(), UserError> {
    check_length("first_name", update.first_name.as_ref(), MAX_NAME_LENGTH)?;
    check_length("last_name", update.last_name.as_ref(), MAX_NAME_LENGTH)?;
    check_length("location", update.location.as_ref(), MAX_NAME_LENGTH)?;
    check_length("bio", update.bio.as_ref(), MAX_BIO_LENGTH)?;
    check_length("avatar_url", update.avatar_url.as_ref(), MAX_URL_LENGTH)?;
    check_length("phone", update.phone.as_ref(), MAX_PHONE_LENGTH)
}

fn validate_preferences(update: &PreferencesUpdate) -> Result<(), UserError> {
    if let Some(theme) = &update.theme
        && !THEMES.contains(&theme.as_str())
    {
        return Err(UserError::Validation(format!(
            "theme must be one of {}",
            THEMES.join(", ")
        )));
    }
    if let Some(currency) = &update.currency {
        currency
            .parse::<CurrencyCode>()
            .map_err(|e| UserError::Validation(e.to_string()))?;
    }
    if let Some(language) = &update.language
        && (language.is_empty() || language.len() > 10)
    {
        return Err(UserError::Validation("language must be a short locale tag".to_string()));
    }
    Ok(())
}
