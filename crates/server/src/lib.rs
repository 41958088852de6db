//! Greens marketplace API server.
//!
//! The server is built as a library so the router and services can be
//! exercised from tests and reused by `greens-cli`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
