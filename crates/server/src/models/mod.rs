//! Domain models returned by services and serialized by handlers.
//!
//! Row types that need parsing (currencies stored as text, JSONB arrays)
//! live next to their repositories; these are the validated shapes.

pub mod cart;
pub mod category;
pub mod notification;
pub mod order;
pub mod product;
pub mod review;
pub mod user;

use greens_core::Pagination;
use serde::Serialize;

/// One page of a list result.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        let pagination = pagination.normalized();
        Self {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        }
    }
}
