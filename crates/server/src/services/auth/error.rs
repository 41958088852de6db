//! Authentication error types.

use thiserror::Error;

use crate::cache::CacheError;
use crate::db::RepositoryError;
use crate::error::{DomainError, ErrorKind};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] greens_core::EmailError),

    #[error("invalid username: {0}")]
    InvalidUsername(#[from] greens_core::UsernameError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("email is already registered")]
    DuplicateEmail,

    #[error("username is already taken")]
    DuplicateUsername,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    /// Bad signature, expired, wrong type, or revoked.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("token signing failed")]
    TokenEncoding,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Revocation list unreachable.
    #[error("session store error: {0}")]
    SessionStore(#[from] CacheError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEmail(_) | Self::InvalidUsername(_) | Self::WeakPassword(_) => {
                ErrorKind::Validation
            }
            Self::DuplicateEmail | Self::DuplicateUsername => ErrorKind::Conflict,
            Self::InvalidCredentials | Self::InvalidOrExpiredToken => ErrorKind::Unauthenticated,
            Self::AccountInactive => ErrorKind::Forbidden,
            Self::TokenEncoding | Self::PasswordHash => ErrorKind::Internal,
            Self::SessionStore(e) => e.kind(),
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "INVALID_EMAIL",
            Self::InvalidUsername(_) => "INVALID_USERNAME",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::DuplicateUsername => "DUPLICATE_USERNAME",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::InvalidOrExpiredToken => "INVALID_TOKEN",
            other => other.kind().code(),
        }
    }
}
