//! In-app notifications. Other services write them inside their own
//! transactions; this service only reads and updates the caller's own.

use sqlx::PgPool;
use thiserror::Error;

use greens_core::{NotificationId, Pagination, UserId};

use crate::db::{NotificationRepository, RepositoryError};
use crate::error::{DomainError, ErrorKind};
use crate::models::notification::{Notification, NotificationList};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,

    #[error("notification belongs to another user")]
    Forbidden,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for NotificationError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOTIFICATION_NOT_FOUND",
            other => other.kind().code(),
        }
    }
}

pub struct NotificationService<'a> {
    notifications: NotificationRepository<'a>,
}

impl<'a> NotificationService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            notifications: NotificationRepository::new(pool),
        }
    }

    /// Newest first, with the caller's total unread count.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn list(
        &self,
        user: UserId,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<NotificationList, NotificationError> {
        let items = self
            .notifications
            .list(user, unread_only, pagination)
            .await?;
        let unread_count = self.notifications.unread_count(user).await?;
        let pagination = pagination.normalized();

        Ok(NotificationList {
            items,
            unread_count,
            page: pagination.page,
            limit: pagination.limit,
        })
    }

    /// # Errors
    ///
    /// Returns `NotificationError::NotFound` or `Forbidden`.
    pub async fn mark_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<Notification, NotificationError> {
        self.check_owner(user, id).await?;
        self.notifications.mark_read(id).await.map_err(not_found)
    }

    /// Returns how many notifications were unread.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the store fails.
    pub async fn mark_all_read(&self, user: UserId) -> Result<u64, NotificationError> {
        Ok(self.notifications.mark_all_read(user).await?)
    }

    /// # Errors
    ///
    /// Returns `NotificationError::NotFound` or `Forbidden`.
    pub async fn delete(&self, user: UserId, id: NotificationId) -> Result<(), NotificationError> {
        self.check_owner(user, id).await?;
        self.notifications.delete(id).await.map_err(not_found)
    }

    async fn check_owner(&self, user: UserId, id: NotificationId) -> Result<(), NotificationError> {
        match self.notifications.owner(id).await? {
            None => Err(NotificationError::NotFound),
            Some(owner) if owner != user => Err(NotificationError::Forbidden),
            Some(_) => Ok(()),
        }
    }
}

fn not_found(e: RepositoryError) -> NotificationError {
    match e {
        RepositoryError::NotFound => NotificationError::NotFound,
        other => NotificationError::Repository(other),
    }
}
