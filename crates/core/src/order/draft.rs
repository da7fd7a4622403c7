//! Pricing a new order before it is stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{
    BuyerRef, DeliveryDetails, Order, OrderLineItem, OrderValidationError, ProductSnapshot,
};
use crate::pricing::{LineAmounts, compute_line};
use crate::types::{FarmerId, OrderId, OrderItemId, OrderStatus, ProductId, TaxRate};

/// A priced line that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub farmer_id: Option<FarmerId>,
    pub product_name: String,
    pub product_unit: String,
    pub unit_price: Decimal,
    pub tax_rate: TaxRate,
    pub quantity: u32,
    pub amounts: LineAmounts,
}

/// A fully priced order ready for one atomic insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub buyer: BuyerRef,
    pub delivery: DeliveryDetails,
    pub lines: Vec<NewOrderLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
}

impl NewOrder {
    /// Attach storage-assigned ids and produce the committed aggregate.
    ///
    /// `item_ids` must yield one id per line, in line order.
    #[must_use]
    pub fn into_order(
        self,
        id: OrderId,
        item_ids: impl IntoIterator<Item = OrderItemId>,
        created_at: DateTime<Utc>,
    ) -> Order {
        let items = self
            .lines
            .into_iter()
            .zip(item_ids)
            .map(|(line, item_id)| OrderLineItem {
                id: item_id,
                order_id: id,
                product_id: line.product_id,
                farmer_id: line.farmer_id,
                product_name: line.product_name,
                product_unit: line.product_unit,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                quantity: line.quantity,
                subtotal: line.amounts.subtotal,
                tax_amount: line.amounts.tax_amount,
                total_amount: line.amounts.total,
            })
            .collect();

        Order {
            id,
            buyer: self.buyer,
            status: OrderStatus::Pending,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            shipping_fee: self.shipping_fee,
            total_amount: self.total_amount,
            delivery: self.delivery,
            items,
            version: 1,
            created_at,
            updated_at: created_at,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }
}

/// Accumulates priced lines in the order they are added.
///
/// Each product snapshot is read once by the caller and passed in; the draft
/// copies name, unit, price and tax rate so later catalog edits never reach
/// the stored order.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    buyer: BuyerRef,
    delivery: DeliveryDetails,
    shipping_fee: Decimal,
    lines: Vec<NewOrderLine>,
    subtotal: Decimal,
    tax_amount: Decimal,
}

impl OrderDraft {
    #[must_use]
    pub fn new(buyer: BuyerRef, delivery: DeliveryDetails, shipping_fee: u64) -> Self {
        Self {
            buyer,
            delivery,
            shipping_fee: Decimal::from(shipping_fee),
            lines: Vec::new(),
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
        }
    }

    /// Price one line against its catalog snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for a non-positive quantity, `ProductInactive`
    /// for a product that is not for sale and `InvalidPrice` for a negative
    /// catalog price.
    pub fn add_line(
        &mut self,
        quantity: i32,
        product: &ProductSnapshot,
    ) -> Result<LineAmounts, OrderValidationError> {
        let product_id = product.product_id;
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(OrderValidationError::InvalidQuantity {
                product_id,
                quantity,
            })?;

        if !product.is_active {
            return Err(OrderValidationError::ProductInactive {
                product_id,
                name: product.name.clone(),
            });
        }

        if product.price < Decimal::ZERO {
            return Err(OrderValidationError::InvalidPrice(product_id));
        }

        let amounts = compute_line(product.price, product.tax_rate, quantity);
        self.subtotal += amounts.subtotal;
        self.tax_amount += amounts.tax_amount;

        self.lines.push(NewOrderLine {
            product_id,
            farmer_id: product.farmer_id,
            product_name: product.name.clone(),
            product_unit: product.unit.clone(),
            unit_price: product.price,
            tax_rate: product.tax_rate,
            quantity,
            amounts,
        });

        Ok(amounts)
    }

    /// Close the draft.
    ///
    /// # Errors
    ///
    /// Returns `EmptyOrder` when no line was added.
    pub fn finish(self) -> Result<NewOrder, OrderValidationError> {
        if self.lines.is_empty() {
            return Err(OrderValidationError::EmptyOrder);
        }

        Ok(NewOrder {
            total_amount: self.subtotal + self.tax_amount + self.shipping_fee,
            buyer: self.buyer,
            delivery: self.delivery,
            lines: self.lines,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            shipping_fee: self.shipping_fee,
        })
    }
}
