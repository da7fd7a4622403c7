//! Post-commit notifications.
//!
//! Order creation hands a committed order to a [`Notifier`] and returns
//! immediately. Delivery happens in a detached task: each recipient is sent
//! to independently, failures are logged and never reach the caller.

pub mod dispatcher;
pub mod messages;

use std::future::Future;

use farmlink_core::billing::{FarmerStatement, MonthlyInvoice};
use farmlink_core::order::Order;
use serde::Serialize;

pub use dispatcher::NotificationDispatcher;

/// Result of delivering one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// No recipient, or notifications are disabled.
    Skipped,
    Failed,
}

/// Tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub const fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent => self.sent += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::Failed => self.failed += 1,
        }
    }
}

/// Receives committed orders and billing events.
pub trait Notifier: Send + Sync + 'static {
    /// Schedule the buyer and farmer messages for a committed order.
    ///
    /// Must not block on delivery.
    fn order_committed(&self, order: &Order);

    /// Tell the buyer a rendered invoice is available at `document_url`.
    fn invoice_ready(
        &self,
        invoice: &MonthlyInvoice,
        document_url: &str,
    ) -> impl Future<Output = DeliveryOutcome> + Send;

    /// Tell the farmer their payment notice is available at `document_url`.
    fn statement_ready(
        &self,
        statement: &FarmerStatement,
        document_url: &str,
    ) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// `None` means notifications are disabled.
impl<T: Notifier> Notifier for Option<T> {
    fn order_committed(&self, order: &Order) {
        if let Some(notifier) = self {
            notifier.order_committed(order);
        }
    }

    async fn invoice_ready(&self, invoice: &MonthlyInvoice, document_url: &str) -> DeliveryOutcome {
        match self {
            Some(notifier) => notifier.invoice_ready(invoice, document_url).await,
            None => DeliveryOutcome::Skipped,
        }
    }

    async fn statement_ready(
        &self,
        statement: &FarmerStatement,
        document_url: &str,
    ) -> DeliveryOutcome {
        match self {
            Some(notifier) => notifier.statement_ready(statement, document_url).await,
            None => DeliveryOutcome::Skipped,
        }
    }
}
