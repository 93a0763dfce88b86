//! bookstore-rs: A digital bookstore server with purchase and rental flows.
//!
//! This crate provides a small e-commerce style bookstore backend: a
//! browsable catalog of PDF books, user accounts, and purchase/rental
//! entitlements gating content access.
//!
//! # Features
//!
//! - Book catalog with category/author/year filtering
//! - User accounts and authentication
//! - Book purchases (permanent entitlement)
//! - Time-bounded rentals with renewal
//! - Rental expiry tracking and due notifications
//! - Access-gated PDF streaming
//! - Admin catalog management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Catalog book model and filters.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Rental lifecycle engine.
pub mod rental;
/// HTTP server.
pub mod server;
/// Entitlements, access gate and notifications.
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
pub use store::StoreService;
