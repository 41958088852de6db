//! Greens Core - Shared domain types for the marketplace.
//!
//! This crate provides the types used by every Greens component:
//! - `server` - The marketplace HTTP API
//! - `cli` - Migrations and operational commands
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. The order and payment state machines live here so
//! the transition tables can be checked without a running store.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, usernames, prices, ratings,
//!   pagination and entity statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
