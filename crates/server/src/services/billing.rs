//! Monthly invoices and farmer statements.
//!
//! Both are computed on demand from committed orders and never stored.

use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use farmlink_core::billing::{
    BillingInputError, BillingPeriod, ClosingDay, FarmerStatement, InvoiceOrder, MonthlyInvoice,
    TargetMonth, aggregate_invoice, aggregate_statement,
};
use farmlink_core::order::BuyerRef;
use farmlink_core::{FarmerId, TaxRate};

use crate::db::{Directory, OrderStore, RepositoryError};
use crate::notifications::{DeliveryOutcome, Notifier};

/// Rate assumed for orders that carry no stored lines.
///
/// Produce is sold at the reduced rate.
pub const INVOICE_FALLBACK_RATE: TaxRate = TaxRate::Reduced;

/// Errors returned by [`BillingService`].
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Input(#[from] BillingInputError),

    #[error("buyer {0} not found")]
    BuyerNotFound(BuyerRef),

    #[error("farmer {0} not found")]
    FarmerNotFound(FarmerId),

    #[error("invalid document url: {0}")]
    InvalidDocumentUrl(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Builds billing documents from committed orders.
pub struct BillingService<S, D, N> {
    store: S,
    directory: D,
    notifier: N,
}

impl<S: OrderStore, D: Directory, N: Notifier> BillingService<S, D, N> {
    #[must_use]
    pub const fn new(store: S, directory: D, notifier: N) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// The period billed as `month` for this buyer, using their closing day.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::BuyerNotFound` for an unknown buyer.
    pub async fn period_for(
        &self,
        buyer: BuyerRef,
        month: TargetMonth,
    ) -> Result<BillingPeriod, BillingError> {
        let profile = self
            .directory
            .buyer(buyer)
            .await?
            .ok_or(BillingError::BuyerNotFound(buyer))?;

        Ok(BillingPeriod::resolve(month, profile.closing_day)?)
    }

    /// Aggregate one buyer's invoice for `month`.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::BuyerNotFound` for an unknown buyer and
    /// `BillingError::Repository` when the orders cannot be read.
    #[instrument(skip(self), fields(buyer = %buyer, month = %month))]
    pub async fn monthly_invoice(
        &self,
        buyer: BuyerRef,
        month: TargetMonth,
    ) -> Result<MonthlyInvoice, BillingError> {
        let period = self.period_for(buyer, month).await?;
        let orders = self.store.orders_for_buyer(buyer, period).await?;
        let orders: Vec<InvoiceOrder> = orders.iter().map(InvoiceOrder::from).collect();

        let invoice = aggregate_invoice(buyer, period, &orders, INVOICE_FALLBACK_RATE);
        info!(
            period = %period,
            orders = invoice.order_count,
            total = %invoice.total_amount,
            approximated = invoice.approximated_orders,
            "Monthly invoice aggregated"
        );
        Ok(invoice)
    }

    /// Aggregate what one farmer supplied in the calendar month.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::FarmerNotFound` for an unknown farmer.
    #[instrument(skip(self), fields(month = %month))]
    pub async fn farmer_statement(
        &self,
        farmer_id: FarmerId,
        month: TargetMonth,
    ) -> Result<FarmerStatement, BillingError> {
        if self.directory.farmer(farmer_id).await?.is_none() {
            return Err(BillingError::FarmerNotFound(farmer_id));
        }

        let period = BillingPeriod::resolve(month, ClosingDay::END_OF_MONTH)?;
        let lines = self.store.farmer_sales(farmer_id, period).await?;
        Ok(aggregate_statement(farmer_id, period, &lines))
    }

    /// Aggregate the invoice and push its document link to the buyer.
    ///
    /// A failed push is reported in the outcome, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidDocumentUrl` unless `document_url` is an
    /// absolute http(s) URL, plus everything [`Self::monthly_invoice`] returns.
    #[instrument(skip(self, document_url), fields(buyer = %buyer, month = %month))]
    pub async fn notify_invoice_ready(
        &self,
        buyer: BuyerRef,
        month: TargetMonth,
        document_url: &str,
    ) -> Result<(MonthlyInvoice, DeliveryOutcome), BillingError> {
        let url = document_link(document_url)?;
        let invoice = self.monthly_invoice(buyer, month).await?;
        let outcome = self.notifier.invoice_ready(&invoice, url.as_str()).await;
        Ok((invoice, outcome))
    }

    /// Aggregate the farmer's statement and push the payment notice link.
    ///
    /// A failed push is reported in the outcome, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidDocumentUrl` unless `document_url` is an
    /// absolute http(s) URL, plus everything [`Self::farmer_statement`] returns.
    #[instrument(skip(self, document_url), fields(month = %month))]
    pub async fn notify_statement_ready(
        &self,
        farmer_id: FarmerId,
        month: TargetMonth,
        document_url: &str,
    ) -> Result<(FarmerStatement, DeliveryOutcome), BillingError> {
        let url = document_link(document_url)?;
        let statement = self.farmer_statement(farmer_id, month).await?;
        let outcome = self.notifier.statement_ready(&statement, url.as_str()).await;
        Ok((statement, outcome))
    }
}

/// Accept only absolute http(s) document links.
fn document_link(raw: &str) -> Result<Url, BillingError> {
    let url = Url::parse(raw).map_err(|e| BillingError::InvalidDocumentUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BillingError::InvalidDocumentUrl(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(url)
}
