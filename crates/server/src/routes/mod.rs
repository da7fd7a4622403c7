//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                                        - Liveness
//! GET   /health/ready                                  - Database ping
//!
//! # Orders
//! POST  /orders                                        - Create order (201)
//! GET   /orders/{id}                                   - Order with lines
//! PATCH /orders/{id}/status                            - {status, expected_version?}
//! POST  /orders/{id}/cancel                            - Cancel (?expected_version=)
//!
//! # Billing
//! GET   /billing/{buyer_kind}/{buyer_id}/{month}        - Monthly invoice (YYYY-MM)
//! POST  /billing/{buyer_kind}/{buyer_id}/{month}/notify - Push invoice link
//! GET   /statements/farmers/{farmer_id}/{month}         - Farmer sales statement
//! POST  /statements/farmers/{farmer_id}/{month}/notify  - Push payment notice link
//! ```
//!
//! Health endpoints are mounted by the binary.

pub mod billing;
pub mod orders;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(orders::router())
        .merge(billing::router())
}
