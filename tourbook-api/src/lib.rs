//! # Tourbook API Server Library
//!
//! HTTP layer of the Tourbook booking backend.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extractors`: JSON body and path id helpers
//! - `middleware`: Authentication, role checks and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
