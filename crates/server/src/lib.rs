//! Farmlink server library.
//!
//! Order creation, the order lifecycle, LINE notifications and monthly
//! billing, exposed over HTTP by the `farmlink-server` binary and reused by
//! the CLI and the integration tests.
//!
//! # Layers
//!
//! - [`routes`] - axum handlers, mapping [`error::AppError`] to responses
//! - [`services`] - order and billing flows
//! - [`db`] - collaborator traits and their `PostgreSQL` implementations
//! - [`notifications`] - post-commit fan-out over [`line`]

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod line;
pub mod notifications;
pub mod routes;
pub mod services;
pub mod state;
