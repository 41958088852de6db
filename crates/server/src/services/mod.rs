//! Business logic services.
//!
//! Each service borrows the stores it needs from `AppState` for the duration
//! of one request and returns its own error type, classified via
//! [`DomainError`](crate::error::DomainError).

pub mod auth;
pub mod cart;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod search;
pub mod users;
