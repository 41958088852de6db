//! Product reviews and seller reputation.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use greens_core::{Pagination, ProductId, Rating, RatingError, UserId};

use crate::db::notifications::NewNotification;
use crate::db::{NotificationRepository, ProductRepository, RepositoryError, ReviewRepository};
use crate::error::{DomainError, ErrorKind};
use crate::models::Page;
use crate::models::notification::kinds;
use crate::models::review::{NewReview, Review, ReviewDraft};

const MAX_REVIEW_TITLE_LENGTH: usize = 200;
const MAX_REVIEW_BODY_LENGTH: usize = 5000;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    InvalidRating(#[from] RatingError),

    #[error("{0}")]
    Validation(String),

    #[error("product not found")]
    ProductNotFound,

    #[error("sellers cannot review their own products")]
    OwnProduct,

    #[error("you have already reviewed this product")]
    AlreadyReviewed,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for ReviewError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRating(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::ProductNotFound => ErrorKind::NotFound,
            Self::OwnProduct => ErrorKind::Forbidden,
            Self::AlreadyReviewed => ErrorKind::Conflict,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRating(_) => "INVALID_RATING",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::OwnProduct => "OWN_PRODUCT",
            Self::AlreadyReviewed => "ALREADY_REVIEWED",
            other => other.kind().code(),
        }
    }
}

pub struct ReviewService<'a> {
    pool: &'a PgPool,
    products: ProductRepository<'a>,
    reviews: ReviewRepository<'a>,
}

impl<'a> ReviewService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            products: ProductRepository::new(pool),
            reviews: ReviewRepository::new(pool),
        }
    }

    /// Review a product. The verified-purchase flag, the review and the
    /// seller's new reputation score are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidRating`, `ProductNotFound`, `OwnProduct`
    /// or `AlreadyReviewed`.
    #[instrument(skip(self, input), fields(reviewer = %reviewer, product_id = %product_id))]
    pub async fn create(
        &self,
        reviewer: UserId,
        product_id: ProductId,
        input: NewReview,
    ) -> Result<Review, ReviewError> {
        let draft = draft_from(input)?;

        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or(ReviewError::ProductNotFound)?;
        if product.seller_id == reviewer {
            return Err(ReviewError::OwnProduct);
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let verified = ReviewRepository::has_purchased(&mut *tx, reviewer, product_id).await?;
        let review = ReviewRepository::insert(
            &mut *tx,
            product_id,
            reviewer,
            product.seller_id,
            &draft,
            verified,
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => ReviewError::AlreadyReviewed,
            other => ReviewError::Repository(other),
        })?;
        ReviewRepository::recompute_reputation(&mut *tx, product.seller_id).await?;

        NotificationRepository::insert(
            &mut *tx,
            &NewNotification {
                user_id: product.seller_id,
                kind: kinds::NEW_REVIEW,
                title: "New review".to_string(),
                message: format!(
                    "\"{}\" received a {}-star review",
                    product.title,
                    draft.rating.get()
                ),
                payload: serde_json::json!({
                    "product_id": product_id,
                    "review_id": review.id,
                    "rating": draft.rating.get(),
                }),
            },
        )
        .await?;

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(review_id = %review.id, verified, "Review created");
        Ok(review)
    }

    /// Reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::ProductNotFound` if the product does not exist.
    pub async fn list(
        &self,
        product_id: ProductId,
        pagination: Pagination,
    ) -> Result<Page<Review>, ReviewError> {
        if self.products.get(product_id).await?.is_none() {
            return Err(ReviewError::ProductNotFound);
        }
        let (items, total) = self.reviews.list_for_product(product_id, pagination).await?;
        Ok(Page::new(items, pagination, total))
    }
}

fn draft_from(input: NewReview) -> Result<ReviewDraft, ReviewError> {
    let rating = Rating::new(input.rating)?;
    let title = non_empty(input.title);
    let body = non_empty(input.body);

    if title
        .as_ref()
        .is_some_and(|t| t.chars().count() > MAX_REVIEW_TITLE_LENGTH)
    {
        return Err(ReviewError::Validation(format!(
            "title must be at most {MAX_REVIEW_TITLE_LENGTH} characters"
        )));
    }
    if body
        .as_ref()
        .is_some_and(|b| b.chars().count() > MAX_REVIEW_BODY_LENGTH)
    {
        return Err(ReviewError::Validation(format!(
            "body must be at most {MAX_REVIEW_BODY_LENGTH} characters"
        )));
    }

    Ok(ReviewDraft {
        rating,
        title,
        body,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rating: i32) -> NewReview {
        NewReview {
            rating,
            title: Some("  Fresh  ".to_string()),
            body: Some(String::new()),
        }
    }

    #[test]
    fn test_rating_range() {
        for rating in 1..=5 {
            assert!(draft_from(input(rating)).is_ok());
        }
        for rating in [0, 6, -1] {
            let err = draft_from(input(rating)).err();
            assert!(matches!(err, Some(ReviewError::InvalidRating(_))));
        }
    }

    #[test]
    fn test_invalid_rating_is_400() {
        let err = draft_from(input(9)).err();
        let err = err.as_ref().map(|e| (e.kind(), e.code()));
        assert_eq!(err, Some((ErrorKind::Validation, "INVALID_RATING")));
    }

    #[test]
    fn test_text_fields_trimmed() {
        let draft = draft_from(input(4)).ok();
        let draft = draft.as_ref();
        assert_eq!(draft.and_then(|d| d.title.as_deref()), Some("Fresh"));
        assert_eq!(draft.and_then(|d| d.body.as_deref()), None);
    }

    #[test]
    fn test_duplicate_is_conflict() {
        assert_eq!(ReviewError::AlreadyReviewed.kind(), ErrorKind::Conflict);
        assert_eq!(ReviewError::OwnProduct.kind(), ErrorKind::Forbidden);
    }
}
