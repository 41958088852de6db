//! Per-user preferences and bounded browsing/search history.

use sqlx::PgPool;

use greens_core::{ProductId, UserId};

use super::RepositoryError;
use crate::models::user::{PreferencesUpdate, UserPreferences};

/// History arrays keep at most this many entries, most recent first.
pub const HISTORY_LIMIT: i32 = 50;

const PREFERENCE_COLUMNS: &str = "theme, language, currency, email_notifications, \
     push_notifications, browsing_history, search_history, updated_at";

pub struct PreferencesRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PreferencesRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch preferences, creating the default row on first access.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user: UserId) -> Result<UserPreferences, RepositoryError> {
        let prefs = sqlx::query_as::<_, UserPreferences>(&format!(
            "INSERT INTO marketplace.user_preferences (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {PREFERENCE_COLUMNS}"
        ))
        .bind(user)
        .fetch_one(self.pool)
        .await?;

        Ok(prefs)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        user: UserId,
        update: &PreferencesUpdate,
    ) -> Result<UserPreferences, RepositoryError> {
        // Ensure the row exists before patching it.
        self.get(user).await?;

        let prefs = sqlx::query_as::<_, UserPreferences>(&format!(
            "UPDATE marketplace.user_preferences SET \
                 theme = COALESCE($2, theme), \
                 language = COALESCE($3, language), \
                 currency = COALESCE($4, currency), \
                 email_notifications = COALESCE($5, email_notifications), \
                 push_notifications = COALESCE($6, push_notifications), \
                 updated_at = NOW() \
             WHERE user_id = $1 \
             RETURNING {PREFERENCE_COLUMNS}"
        ))
        .bind(user)
        .bind(update.theme.as_deref())
        .bind(update.language.as_deref())
        .bind(update.currency.as_deref())
        .bind(update.email_notifications)
        .bind(update.push_notifications)
        .fetch_one(self.pool)
        .await?;

        Ok(prefs)
    }

    /// Move `product` to the front of the browsing history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_view(&self, user: UserId, product: ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO marketplace.user_preferences (user_id, browsing_history) \
             VALUES ($1, ARRAY[$2]::INTEGER[]) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 browsing_history = (array_prepend($2, \
                     array_remove(user_preferences.browsing_history, $2)))[1:$3], \
                 updated_at = NOW()",
        )
        .bind(user)
        .bind(product)
        .bind(HISTORY_LIMIT)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Move `query` to the front of the search history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_search(&self, user: UserId, query: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO marketplace.user_preferences (user_id, search_history) \
             VALUES ($1, ARRAY[$2]::TEXT[]) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 search_history = (array_prepend($2::TEXT, \
                     array_remove(user_preferences.search_history, $2::TEXT)))[1:$3], \
                 updated_at = NOW()",
        )
        .bind(user)
        .bind(query)
        .bind(HISTORY_LIMIT)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
