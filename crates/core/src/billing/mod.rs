//! Monthly billing.
//!
//! Nothing here is persisted: periods, invoices and farmer statements are
//! recomputed from committed orders every time they are requested.

pub mod invoice;
pub mod period;
pub mod statement;

pub use invoice::{
    DailyAmount, InvoiceOrder, MonthlyInvoice, TaxBucket, TaxedAmount, aggregate_invoice,
};
pub use period::{BillingInputError, BillingPeriod, ClosingDay, TargetMonth, resolve};
pub use statement::{FarmerSaleLine, FarmerStatement, StatementDay, aggregate_statement};
