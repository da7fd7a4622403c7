//! Application services.
//!
//! Services own the business flow and talk to storage and messaging only
//! through the collaborator traits in [`crate::db`] and
//! [`crate::notifications`].

pub mod billing;
pub mod orders;

pub use billing::{BillingError, BillingService, INVOICE_FALLBACK_RATE};
pub use orders::{OrderError, OrderService};
