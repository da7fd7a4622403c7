//! Farmlink Core - Shared types and business rules.
//!
//! This crate provides the domain model used by every Farmlink component:
//! - `server` - Order, notification and billing HTTP service
//! - `cli` - Command-line tools for migrations and billing exports
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything here is deterministic, which is what
//! makes the money arithmetic testable in isolation.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and status enums
//! - [`pricing`] - Line pricing, tax rounding and tax-inclusive splitting
//! - [`order`] - Order aggregate, creation draft and status state machine
//! - [`billing`] - Billing periods, monthly invoices and farmer statements

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod billing;
pub mod order;
pub mod pricing;
pub mod types;

pub use types::*;
