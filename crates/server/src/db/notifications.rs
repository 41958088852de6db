//! Notification repository.

use sqlx::{PgConnection, PgPool};

use greens_core::{NotificationId, Pagination, UserId};

use super::RepositoryError;
use crate::models::notification::Notification;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, payload, is_read, read_at, created_at";

/// A notification to be written alongside some other change.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert on the caller's connection so it commits with the triggering change.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert(
        conn: &mut PgConnection,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let row = sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO marketplace.notification (user_id, kind, title, message, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(notification.user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.payload)
        .fetch_one(conn)
        .await?;

        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user: UserId,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM marketplace.notification \
             WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user)
        .bind(unread_only)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_count(&self, user: UserId) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM marketplace.notification WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Owner of a notification, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn owner(&self, id: NotificationId) -> Result<Option<UserId>, RepositoryError> {
        let row: Option<(UserId,)> =
            sqlx::query_as("SELECT user_id FROM marketplace.notification WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(|(user,)| user))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no row matched.
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification, RepositoryError> {
        sqlx::query_as::<_, Notification>(&format!(
            "UPDATE marketplace.notification \
             SET is_read = TRUE, read_at = COALESCE(read_at, NOW()) \
             WHERE id = $1 \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Returns how many notifications changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_all_read(&self, user: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE marketplace.notification SET is_read = TRUE, read_at = NOW() \
             WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no row matched.
    pub async fn delete(&self, id: NotificationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM marketplace.notification WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
