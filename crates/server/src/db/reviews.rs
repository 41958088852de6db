//! Review repository.

use sqlx::{PgConnection, PgPool};

use greens_core::{Pagination, ProductId, UserId};

use super::{RepositoryError, map_unique};
use crate::models::review::{Review, ReviewDraft};

const REVIEW_COLUMNS: &str = "id, product_id, reviewer_id, seller_id, rating, title, body, \
     is_verified_purchase, created_at";

pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews of a product, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product: ProductId,
        pagination: Pagination,
    ) -> Result<(Vec<Review>, i64), RepositoryError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM marketplace.review \
             WHERE product_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(product)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM marketplace.review WHERE product_id = $1")
                .bind(product)
                .fetch_one(self.pool)
                .await?;

        Ok((reviews, total))
    }

    /// Whether `reviewer` bought `product` in an order that was paid for.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_purchased(
        conn: &mut PgConnection,
        reviewer: UserId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        let (purchased,): (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                 SELECT 1 FROM marketplace.order o \
                 JOIN marketplace.order_item i ON i.order_id = o.id \
                 WHERE o.buyer_id = $1 AND i.product_id = $2 \
                   AND o.status IN ('paid', 'shipped', 'delivered') \
             )",
        )
        .bind(reviewer)
        .bind(product)
        .fetch_one(conn)
        .await?;

        Ok(purchased)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the reviewer already reviewed the product.
    pub async fn insert(
        conn: &mut PgConnection,
        product: ProductId,
        reviewer: UserId,
        seller: UserId,
        draft: &ReviewDraft,
        verified_purchase: bool,
    ) -> Result<Review, RepositoryError> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "INSERT INTO marketplace.review \
                 (product_id, reviewer_id, seller_id, rating, title, body, is_verified_purchase) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(product)
        .bind(reviewer)
        .bind(seller)
        .bind(draft.rating.get())
        .bind(draft.title.as_deref())
        .bind(draft.body.as_deref())
        .bind(verified_purchase)
        .fetch_one(conn)
        .await
        .map_err(map_unique)?;

        Ok(review)
    }

    /// Set the seller's reputation to the average rating across all their reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn recompute_reputation(
        conn: &mut PgConnection,
        seller: UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE marketplace.user SET \
                 reputation_score = COALESCE( \
                     (SELECT ROUND(AVG(rating)::NUMERIC, 2) \
                      FROM marketplace.review WHERE seller_id = $1), 0), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(seller)
        .execute(conn)
        .await?;

        Ok(())
    }
}
