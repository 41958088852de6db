//! Database operations for the marketplace `PostgreSQL` store.
//!
//! # Schema: `marketplace`
//!
//! - `user`, `user_preferences` - Accounts, profiles, browsing/search history
//! - `category`, `product`, `product_embedding` - Catalog and vectors (pgvector)
//! - `review` - One review per (product, reviewer)
//! - `cart_item`, `wishlist_item` - Per-user lists
//! - `order`, `order_item` - Orders and immutable line snapshots
//! - `notification` - In-app notifications
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p greens-cli -- migrate
//! ```

pub mod cart;
pub mod categories;
pub mod embeddings;
pub mod notifications;
pub mod orders;
pub mod preferences;
pub mod products;
pub mod reviews;
pub mod users;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

pub use cart::CartRepository;
pub use categories::CategoryRepository;
pub use notifications::NotificationRepository;
pub use orders::OrderRepository;
pub use preferences::PreferencesRepository;
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether the store itself is unreachable, as opposed to a bad query.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            )
        )
    }
}

/// Map unique violations to `Conflict`, keeping the constraint name.
pub(crate) fn map_unique(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(db_err.constraint().unwrap_or("unique").to_owned());
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    options: PgConnectOptions,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Format an embedding as a pgvector text literal, bound then cast `::vector`.
pub(crate) fn format_embedding(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(ToString::to_string).collect();
    format!("[{}]", values.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_embedding() {
        assert_eq!(format_embedding(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(format_embedding(&[]), "[]");
    }

    #[test]
    fn test_connectivity_errors_are_unavailable() {
        assert!(RepositoryError::Database(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(RepositoryError::Database(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!RepositoryError::Database(sqlx::Error::RowNotFound).is_unavailable());
        assert!(!RepositoryError::NotFound.is_unavailable());
    }
}
