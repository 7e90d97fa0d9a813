/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `factory`: generic CRUD handlers shared by every resource
/// - `health`: Health check endpoint
/// - `auth`: Signup, login and current-user endpoints
/// - `tours`, `users`, `reviews`, `bookings`: resource hooks and extra endpoints
/// - `webhook`: payment provider events

pub mod auth;
pub mod bookings;
pub mod factory;
pub mod health;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod webhook;
