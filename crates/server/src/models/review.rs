use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use greens_core::{ProductId, Rating, ReviewId, UserId};

/// A product review.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub reviewer_id: UserId,
    pub seller_id: UserId,
    pub rating: i16,
    pub title: Option<String>,
    pub body: Option<String>,
    /// Computed server-side from the reviewer's orders.
    pub is_verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /products/{id}/reviews`. The rating is range-checked by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub rating: i32,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// A validated review ready for insert.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub rating: Rating,
    pub title: Option<String>,
    pub body: Option<String>,
}
