//! # Tourbook Shared Library
//!
//! Domain types, persistence and integrations used by the Tourbook API
//! server.
//!
//! ## Module Organization
//!
//! - `models`: users, tours, reviews and bookings
//! - `query`: list query parameters (filter, sort, fields, pagination)
//! - `repository`: generic repository trait with PostgreSQL and in-memory backends
//! - `db`: connection pool and migrations
//! - `auth`: password hashing, session tokens, role checks
//! - `payments`: payment provider trait, Stripe client, webhook signatures
//! - `checkout`: checkout session requests and booking reconciliation

pub mod auth;
pub mod checkout;
pub mod db;
pub mod models;
pub mod payments;
pub mod query;
pub mod repository;

/// Current version of the Tourbook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
