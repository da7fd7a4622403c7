//! Order persistence.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a live database or offline query data.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use farmlink_core::billing::{BillingPeriod, FarmerSaleLine};
use farmlink_core::order::{BuyerRef, DeliveryDetails, NewOrder, Order, OrderLineItem};
use farmlink_core::{
    BuyerId, BuyerKind, DeliveryKind, DeliverySlotId, FarmerId, OrderId, OrderItemId,
    OrderStatus, ProductId,
};

use super::{
    OrderStore, RepositoryError, quantity_from_column, tax_rate_column, tax_rate_from_column,
};

const ORDER_COLUMNS: &str = r"
    id, buyer_kind, buyer_id, status, subtotal, tax_amount, shipping_fee, total_amount,
    delivery_kind, delivery_date, delivery_slot_id, delivery_time, delivery_address,
    delivery_notes, version, created_at, updated_at, confirmed_at, shipped_at,
    delivered_at, cancelled_at
";

const ITEM_COLUMNS: &str = r"
    id, order_id, product_id, farmer_id, product_name, product_unit, unit_price,
    tax_rate, quantity, subtotal, tax_amount, total_amount
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    buyer_kind: BuyerKind,
    buyer_id: i32,
    status: OrderStatus,
    subtotal: Decimal,
    tax_amount: Decimal,
    shipping_fee: Decimal,
    total_amount: Decimal,
    delivery_kind: DeliveryKind,
    delivery_date: NaiveDate,
    delivery_slot_id: Option<i32>,
    delivery_time: String,
    delivery_address: Option<String>,
    delivery_notes: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLineItem>) -> Order {
        Order {
            id: OrderId::new(self.id),
            buyer: BuyerRef::new(self.buyer_kind, BuyerId::new(self.buyer_id)),
            status: self.status,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            shipping_fee: self.shipping_fee,
            total_amount: self.total_amount,
            delivery: DeliveryDetails {
                kind: self.delivery_kind,
                date: self.delivery_date,
                slot_id: self.delivery_slot_id.map(DeliverySlotId::new),
                time_label: self.delivery_time,
                address: self.delivery_address,
                notes: self.delivery_notes,
            },
            items,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            confirmed_at: self.confirmed_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    farmer_id: Option<i32>,
    product_name: String,
    product_unit: String,
    unit_price: Decimal,
    tax_rate: i16,
    quantity: i32,
    subtotal: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
}

impl TryFrom<OrderItemRow> for OrderLineItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            farmer_id: row.farmer_id.map(FarmerId::new),
            product_name: row.product_name,
            product_unit: row.product_unit,
            unit_price: row.unit_price,
            tax_rate: tax_rate_from_column(row.tax_rate)?,
            quantity: quantity_from_column(row.quantity)?,
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FarmerSaleRow {
    order_id: i32,
    delivery_date: NaiveDate,
    status: OrderStatus,
    product_name: String,
    product_unit: String,
    quantity: i32,
    tax_rate: i16,
    subtotal: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
}

impl TryFrom<FarmerSaleRow> for FarmerSaleLine {
    type Error = RepositoryError;

    fn try_from(row: FarmerSaleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: OrderId::new(row.order_id),
            delivery_date: row.delivery_date,
            status: row.status,
            product_name: row.product_name,
            product_unit: row.product_unit,
            quantity: quantity_from_column(row.quantity)?,
            tax_rate: tax_rate_from_column(row.tax_rate)?,
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` order store.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Line items of several orders, grouped by order id.
    async fn items_for(
        &self,
        order_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<OrderLineItem>>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, id"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i32, Vec<OrderLineItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped.entry(order_id).or_default().push(row.try_into()?);
        }
        Ok(grouped)
    }
}

impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(buyer = %order.buyer, lines = order.lines.len()))]
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (order_id, created_at): (i32, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO orders (
                buyer_kind, buyer_id, status, subtotal, tax_amount, shipping_fee, total_amount,
                delivery_kind, delivery_date, delivery_slot_id, delivery_time,
                delivery_address, delivery_notes
            )
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, created_at
            ",
        )
        .bind(order.buyer.kind)
        .bind(order.buyer.id.as_i32())
        .bind(order.subtotal)
        .bind(order.tax_amount)
        .bind(order.shipping_fee)
        .bind(order.total_amount)
        .bind(order.delivery.kind)
        .bind(order.delivery.date)
        .bind(order.delivery.slot_id.map(|id| id.as_i32()))
        .bind(&order.delivery.time_label)
        .bind(order.delivery.address.as_deref())
        .bind(order.delivery.notes.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        let mut item_ids = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} out of range", line.quantity))
            })?;

            let (item_id,): (i32,) = sqlx::query_as(
                r"
                INSERT INTO order_items (
                    order_id, product_id, farmer_id, product_name, product_unit, unit_price,
                    tax_rate, quantity, subtotal, tax_amount, total_amount
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING id
                ",
            )
            .bind(order_id)
            .bind(line.product_id.as_i32())
            .bind(line.farmer_id.map(|id| id.as_i32()))
            .bind(&line.product_name)
            .bind(&line.product_unit)
            .bind(line.unit_price)
            .bind(tax_rate_column(line.tax_rate))
            .bind(quantity)
            .bind(line.amounts.subtotal)
            .bind(line.amounts.tax_amount)
            .bind(line.amounts.total)
            .fetch_one(&mut *tx)
            .await?;

            item_ids.push(OrderItemId::new(item_id));
        }

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await?;
        debug!(order_id, "Order committed");

        Ok(order.into_order(OrderId::new(order_id), item_ids, created_at))
    }

    #[instrument(skip(self))]
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = self
            .items_for(&[row.id])
            .await?
            .remove(&row.id)
            .unwrap_or_default();
        Ok(Some(row.into_order(items)))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    async fn save_status(&self, order: &Order) -> Result<i32, RepositoryError> {
        let version: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE orders
            SET status = $1,
                confirmed_at = $2,
                shipped_at = $3,
                delivered_at = $4,
                cancelled_at = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $7 AND version = $8
            RETURNING version
            ",
        )
        .bind(order.status)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .bind(order.id.as_i32())
        .bind(order.version)
        .fetch_optional(&self.pool)
        .await?;

        version.map(|(v,)| v).ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "order {} is no longer at version {}",
                order.id, order.version
            ))
        })
    }

    #[instrument(skip(self), fields(buyer = %buyer, period = %period))]
    async fn orders_for_buyer(
        &self,
        buyer: BuyerRef,
        period: BillingPeriod,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE buyer_kind = $1
              AND buyer_id = $2
              AND delivery_date BETWEEN $3 AND $4
              AND status <> 'cancelled'
            ORDER BY delivery_date, id
            "
        ))
        .bind(buyer.kind)
        .bind(buyer.id.as_i32())
        .bind(period.start_date)
        .bind(period.end_date)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect())
    }

    #[instrument(skip(self), fields(period = %period))]
    async fn farmer_sales(
        &self,
        farmer: FarmerId,
        period: BillingPeriod,
    ) -> Result<Vec<FarmerSaleLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, FarmerSaleRow>(
            r"
            SELECT oi.order_id, o.delivery_date, o.status, oi.product_name, oi.product_unit,
                   oi.quantity, oi.tax_rate, oi.subtotal, oi.tax_amount, oi.total_amount
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE oi.farmer_id = $1
              AND o.delivery_date BETWEEN $2 AND $3
              AND o.status <> 'cancelled'
            ORDER BY o.delivery_date, oi.order_id, oi.id
            ",
        )
        .bind(farmer.as_i32())
        .bind(period.start_date)
        .bind(period.end_date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
