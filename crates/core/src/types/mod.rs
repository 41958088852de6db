//! Core types for the marketplace.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod pagination;
pub mod price;
pub mod rating;
pub mod status;
pub mod username;

pub use email::{Email, EmailError};
pub use id::*;
pub use pagination::Pagination;
pub use price::{CurrencyCode, Price, PriceError};
pub use rating::{Rating, RatingError};
pub use status::*;
pub use username::{Username, UsernameError};
