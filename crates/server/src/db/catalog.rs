//! Catalog reads: products and delivery slots.
//!
//! Reads go straight to the pool; order creation never locks catalog rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use farmlink_core::order::{DeliverySlot, ProductSnapshot};
use farmlink_core::{DeliverySlotId, DeliverySlotType, FarmerId, ProductId};

use super::{Catalog, RepositoryError, tax_rate_from_column};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    farmer_id: Option<i32>,
    name: String,
    unit: String,
    price: Decimal,
    tax_rate: i16,
    is_active: bool,
}

impl TryFrom<ProductRow> for ProductSnapshot {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: ProductId::new(row.id),
            name: row.name,
            unit: row.unit,
            price: row.price,
            tax_rate: tax_rate_from_column(row.tax_rate)?,
            is_active: row.is_active,
            farmer_id: row.farmer_id.map(FarmerId::new),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliverySlotRow {
    id: i32,
    date: NaiveDate,
    slot_type: DeliverySlotType,
    is_active: bool,
    time_text: String,
}

impl From<DeliverySlotRow> for DeliverySlot {
    fn from(row: DeliverySlotRow) -> Self {
        Self {
            id: DeliverySlotId::new(row.id),
            date: row.date,
            slot_type: row.slot_type,
            is_active: row.is_active,
            time_text: row.time_text,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` catalog.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Catalog for PgCatalog {
    #[instrument(skip(self))]
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, farmer_id, name, unit, price, tax_rate, is_active
            FROM products
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn delivery_slot(
        &self,
        id: DeliverySlotId,
    ) -> Result<Option<DeliverySlot>, RepositoryError> {
        let row = sqlx::query_as::<_, DeliverySlotRow>(
            r"
            SELECT id, date, slot_type, is_active, time_text
            FROM delivery_slots
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
