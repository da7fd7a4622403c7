//! Billing exports.
//!
//! # Usage
//!
//! ```bash
//! # Preview the period a closing day produces (no database needed)
//! fl-cli period --month 2026-01 --closing-day 20
//!
//! # Export a buyer's monthly invoice as JSON
//! fl-cli invoice --buyer-kind restaurant --buyer-id 3 --month 2026-01
//!
//! # Export a farmer's sales statement as JSON
//! fl-cli statement --farmer-id 5 --month 2026-01
//! ```
//!
//! The JSON is what the document renderer consumes.

use farmlink_core::billing::{BillingPeriod, ClosingDay, TargetMonth};
use farmlink_core::order::BuyerRef;
use farmlink_core::{BuyerId, BuyerKind, FarmerId};
use farmlink_server::db::{PgDirectory, PgOrderStore};
use farmlink_server::services::BillingService;
use farmlink_server::state::LineNotifier;

use super::{CommandError, connect, print_json};

/// Print the billing period for `month` and `closing_day`.
///
/// # Errors
///
/// Returns `CommandError::BillingInput` for an out-of-range closing day.
pub fn period(month: TargetMonth, closing_day: i32) -> Result<(), CommandError> {
    let period = BillingPeriod::resolve(month, ClosingDay::new(closing_day)?)?;
    print_json(&period)
}

async fn service() -> Result<BillingService<PgOrderStore, PgDirectory, LineNotifier>, CommandError> {
    let pool = connect().await?;
    Ok(BillingService::new(
        PgOrderStore::new(pool.clone()),
        PgDirectory::new(pool),
        None,
    ))
}

/// Print one buyer's monthly invoice.
///
/// # Errors
///
/// Returns `CommandError::Billing` for an unknown buyer or a database failure.
pub async fn invoice(kind: BuyerKind, buyer_id: i32, month: TargetMonth) -> Result<(), CommandError> {
    let buyer = BuyerRef::new(kind, BuyerId::new(buyer_id));
    let invoice = service().await?.monthly_invoice(buyer, month).await?;

    if invoice.approximated_orders > 0 {
        tracing::warn!(
            orders = invoice.approximated_orders,
            "Some orders had no stored lines; their tax was estimated"
        );
    }
    print_json(&invoice)
}

/// Print one farmer's monthly statement.
///
/// # Errors
///
/// Returns `CommandError::Billing` for an unknown farmer or a database failure.
pub async fn statement(farmer_id: i32, month: TargetMonth) -> Result<(), CommandError> {
    let statement = service()
        .await?
        .farmer_statement(FarmerId::new(farmer_id), month)
        .await?;
    print_json(&statement)
}
