//! Database operations for the marketplace `PostgreSQL`.
//!
//! ## Tables
//!
//! - `farmers` - Producers supplying products, with their LINE identity
//! - `restaurants` - B2B buyers, with their billing closing day
//! - `consumers` - B2C buyers
//! - `products` - Catalog (price, tax rate, sale flag, supplying farmer)
//! - `delivery_slots` - Published consumer delivery/pickup slots
//! - `orders` - Orders of both buyer kinds, discriminated by `buyer_kind`
//! - `order_items` - Line items with snapshot columns, cascade-deleted with the order
//!
//! # Collaborator traits
//!
//! Services depend on [`Catalog`], [`OrderStore`] and [`Directory`] rather
//! than on the pool, so they can run against in-memory implementations.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p farmlink-cli -- migrate
//! ```

pub mod catalog;
pub mod directory;
pub mod orders;

use std::future::Future;
use std::time::Duration;

use farmlink_core::billing::{BillingPeriod, ClosingDay, FarmerSaleLine};
use farmlink_core::order::{BuyerRef, DeliverySlot, NewOrder, Order, ProductSnapshot};
use farmlink_core::{DeliverySlotId, FarmerId, OrderId, ProductId, TaxRate};
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use catalog::PgCatalog;
pub use directory::PgDirectory;
pub use orders::PgOrderStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The row changed since it was read (stale version).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Profiles
// =============================================================================

/// What the service needs to know about a buyer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerProfile {
    pub buyer: BuyerRef,
    pub name: String,
    /// Linked LINE user id, if the buyer connected their account.
    pub line_user_id: Option<String>,
    /// Delivery address on file.
    pub address: Option<String>,
    /// Consumers always bill by calendar month.
    pub closing_day: ClosingDay,
}

/// What the service needs to know about a farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FarmerProfile {
    pub id: FarmerId,
    pub name: String,
    pub line_user_id: Option<String>,
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Read access to the product catalog and delivery slots.
pub trait Catalog: Send + Sync + 'static {
    /// Current snapshot of a product, `None` if it does not exist.
    fn product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<ProductSnapshot>, RepositoryError>> + Send;

    /// A delivery slot, `None` if it does not exist.
    fn delivery_slot(
        &self,
        id: DeliverySlotId,
    ) -> impl Future<Output = Result<Option<DeliverySlot>, RepositoryError>> + Send;
}

/// Order persistence.
pub trait OrderStore: Send + Sync + 'static {
    /// Store the header and every line in one transaction.
    ///
    /// Either the whole order is visible afterwards or none of it is.
    fn insert(&self, order: NewOrder) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Load an order with its line items.
    fn get(&self, id: OrderId) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Persist the status and timestamps of `order` if its stored version is
    /// still `order.version`, returning the new version.
    ///
    /// Fails with [`RepositoryError::Conflict`] when another writer got there
    /// first.
    fn save_status(&self, order: &Order) -> impl Future<Output = Result<i32, RepositoryError>> + Send;

    /// Non-cancelled orders of a buyer delivered within the period, with lines.
    fn orders_for_buyer(
        &self,
        buyer: BuyerRef,
        period: BillingPeriod,
    ) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// Non-cancelled line items supplied by a farmer within the period.
    fn farmer_sales(
        &self,
        farmer: FarmerId,
        period: BillingPeriod,
    ) -> impl Future<Output = Result<Vec<FarmerSaleLine>, RepositoryError>> + Send;
}

/// Buyer and farmer account lookups.
pub trait Directory: Send + Sync + 'static {
    fn buyer(
        &self,
        buyer: BuyerRef,
    ) -> impl Future<Output = Result<Option<BuyerProfile>, RepositoryError>> + Send;

    fn farmer(
        &self,
        id: FarmerId,
    ) -> impl Future<Output = Result<Option<FarmerProfile>, RepositoryError>> + Send;
}

// =============================================================================
// Column helpers
// =============================================================================

/// `tax_rate` columns hold the whole percent.
const fn tax_rate_column(rate: TaxRate) -> i16 {
    match rate {
        TaxRate::Reduced => 8,
        TaxRate::Standard => 10,
    }
}

fn tax_rate_from_column(value: i16) -> Result<TaxRate, RepositoryError> {
    TaxRate::try_from(i32::from(value)).map_err(RepositoryError::DataCorruption)
}

fn quantity_from_column(value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| RepositoryError::DataCorruption(format!("invalid quantity {value}")))
}
