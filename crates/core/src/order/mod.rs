//! Order aggregate.
//!
//! One [`Order`] type serves both restaurant and consumer buyers; the buyer
//! kind only changes how delivery is described and which shipping fee applies.
//! Line items carry snapshot fields copied from the catalog when the order is
//! created and are never re-derived afterwards.
//!
//! - [`draft`] prices a new order line by line
//! - [`lifecycle`] holds the status state machine

pub mod draft;
pub mod lifecycle;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    BuyerId, BuyerKind, DeliveryKind, DeliverySlotId, DeliverySlotType, DeliveryTimeSlot,
    FarmerId, OrderId, OrderItemId, OrderStatus, ProductId, TaxRate,
};

pub use draft::{NewOrder, NewOrderLine, OrderDraft};
pub use lifecycle::{TransitionError, TransitionOutcome};

// =============================================================================
// References and collaborator snapshots
// =============================================================================

/// Identifies the account that placed an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuyerRef {
    pub kind: BuyerKind,
    pub id: BuyerId,
}

impl BuyerRef {
    #[must_use]
    pub const fn new(kind: BuyerKind, id: BuyerId) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub const fn restaurant(id: i32) -> Self {
        Self::new(BuyerKind::Restaurant, BuyerId::new(id))
    }

    #[must_use]
    pub const fn consumer(id: i32) -> Self {
        Self::new(BuyerKind::Consumer, BuyerId::new(id))
    }
}

impl std::fmt::Display for BuyerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Current catalog data for a product, read once per order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub unit: String,
    pub price: Decimal,
    pub tax_rate: TaxRate,
    pub is_active: bool,
    /// Supplying farmer; `None` for products sold by the platform itself.
    pub farmer_id: Option<FarmerId>,
}

/// A published consumer delivery slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySlot {
    pub id: DeliverySlotId,
    pub date: NaiveDate,
    pub slot_type: DeliverySlotType,
    pub is_active: bool,
    pub time_text: String,
}

// =============================================================================
// Creation requests
// =============================================================================

/// How the buyer wants the order delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryRequest {
    /// Restaurant route delivery on a chosen date and time window.
    Route {
        date: NaiveDate,
        time_slot: DeliveryTimeSlot,
        address: String,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Consumer delivery against a published slot.
    Slot {
        slot_id: DeliverySlotId,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
}

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Input of order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub buyer: BuyerRef,
    pub delivery: DeliveryRequest,
    pub items: Vec<OrderItemRequest>,
}

// =============================================================================
// Aggregate
// =============================================================================

/// Delivery descriptor stored on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub kind: DeliveryKind,
    pub date: NaiveDate,
    pub slot_id: Option<DeliverySlotId>,
    pub time_label: String,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl DeliveryDetails {
    /// Build a restaurant route delivery.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryMismatch` for non-restaurant buyers and
    /// `MissingDeliveryAddress` for a blank address.
    pub fn route(
        buyer_kind: BuyerKind,
        date: NaiveDate,
        time_slot: DeliveryTimeSlot,
        address: String,
        notes: Option<String>,
    ) -> Result<Self, OrderValidationError> {
        if buyer_kind != BuyerKind::Restaurant {
            return Err(OrderValidationError::DeliveryMismatch {
                buyer_kind,
                delivery: DeliveryKind::Route,
            });
        }

        let address = non_blank(Some(address))
            .ok_or(OrderValidationError::MissingDeliveryAddress(DeliveryKind::Route))?;

        Ok(Self {
            kind: DeliveryKind::Route,
            date,
            slot_id: None,
            time_label: time_slot.label().to_string(),
            address: Some(address),
            notes: non_blank(notes),
        })
    }

    /// Build a consumer delivery from a looked-up slot.
    ///
    /// `slot` is the result of looking up `slot_id`; `None` means the slot
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` for a missing or inactive slot,
    /// `DeliveryMismatch` for non-consumer buyers and `MissingDeliveryAddress`
    /// when a home slot has no address.
    pub fn from_slot(
        buyer_kind: BuyerKind,
        slot_id: DeliverySlotId,
        slot: Option<DeliverySlot>,
        address: Option<String>,
        notes: Option<String>,
    ) -> Result<Self, OrderValidationError> {
        let slot = slot.ok_or(OrderValidationError::InvalidSlot {
            slot_id,
            reason: SlotRejection::Missing,
        })?;

        if !slot.is_active {
            return Err(OrderValidationError::InvalidSlot {
                slot_id,
                reason: SlotRejection::Inactive,
            });
        }

        let kind = DeliveryKind::from(slot.slot_type);
        if buyer_kind != BuyerKind::Consumer {
            return Err(OrderValidationError::DeliveryMismatch {
                buyer_kind,
                delivery: kind,
            });
        }

        let address = non_blank(address);
        if kind == DeliveryKind::Home && address.is_none() {
            return Err(OrderValidationError::MissingDeliveryAddress(kind));
        }

        Ok(Self {
            kind,
            date: slot.date,
            slot_id: Some(slot.id),
            time_label: slot.time_text,
            address,
            notes: non_blank(notes),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A line of a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub farmer_id: Option<FarmerId>,
    pub product_name: String,
    pub product_unit: String,
    pub unit_price: Decimal,
    pub tax_rate: TaxRate,
    pub quantity: u32,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// A committed order with its line items.
///
/// `total_amount == subtotal + tax_amount + shipping_fee` holds from creation
/// on; nothing in this crate recomputes the amounts afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: BuyerRef,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    /// Tax-inclusive flat fee.
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
    pub delivery: DeliveryDetails,
    pub items: Vec<OrderLineItem>,
    /// Incremented on every persisted status change.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the stored amounts still add up.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        self.total_amount == self.subtotal + self.tax_amount + self.shipping_fee
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a delivery slot was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRejection {
    Missing,
    Inactive,
}

impl std::fmt::Display for SlotRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "not found"),
            Self::Inactive => write!(f, "not open for orders"),
        }
    }
}

/// Reasons an order cannot be created. No order is stored when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    #[error("order has no items")]
    EmptyOrder,

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("product {name} ({product_id}) is not available for sale")]
    ProductInactive { product_id: ProductId, name: String },

    #[error("quantity for product {product_id} must be positive (got {quantity})")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    #[error("product {0} has a negative price")]
    InvalidPrice(ProductId),

    #[error("delivery slot {slot_id} is {reason}")]
    InvalidSlot {
        slot_id: DeliverySlotId,
        reason: SlotRejection,
    },

    #[error("a delivery address is required for {} orders", .0.label())]
    MissingDeliveryAddress(DeliveryKind),

    #[error("{buyer_kind} accounts cannot order with {} delivery", .delivery.label())]
    DeliveryMismatch {
        buyer_kind: BuyerKind,
        delivery: DeliveryKind,
    },
}

impl OrderValidationError {
    /// Whether the error names something that does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProductNotFound(_)
                | Self::InvalidSlot {
                    reason: SlotRejection::Missing,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn slot(slot_type: DeliverySlotType, is_active: bool) -> DeliverySlot {
        DeliverySlot {
            id: DeliverySlotId::new(5),
            date: date(2026, 3, 14),
            slot_type,
            is_active,
            time_text: "Sat 10:00-12:00".to_string(),
        }
    }

    #[test]
    fn test_route_delivery_requires_restaurant() {
        let err = DeliveryDetails::route(
            BuyerKind::Consumer,
            date(2026, 3, 14),
            DeliveryTimeSlot::Noon,
            "1-2-3 Chuo".to_string(),
            None,
        )
        .expect_err("consumers cannot use routes");
        assert!(matches!(err, OrderValidationError::DeliveryMismatch { .. }));
    }

    #[test]
    fn test_route_delivery_requires_address() {
        let err = DeliveryDetails::route(
            BuyerKind::Restaurant,
            date(2026, 3, 14),
            DeliveryTimeSlot::Noon,
            "   ".to_string(),
            None,
        )
        .expect_err("blank address");
        assert_eq!(
            err,
            OrderValidationError::MissingDeliveryAddress(DeliveryKind::Route)
        );
    }

    #[test]
    fn test_route_delivery_uses_time_window_label() {
        let delivery = DeliveryDetails::route(
            BuyerKind::Restaurant,
            date(2026, 3, 14),
            DeliveryTimeSlot::Evening,
            "1-2-3 Chuo".to_string(),
            Some(String::new()),
        )
        .expect("valid route");
        assert_eq!(delivery.time_label, "16:00-18:00");
        assert_eq!(delivery.notes, None);
    }

    #[test]
    fn test_missing_slot_is_invalid() {
        let err = DeliveryDetails::from_slot(
            BuyerKind::Consumer,
            DeliverySlotId::new(5),
            None,
            None,
            None,
        )
        .expect_err("missing slot");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_inactive_slot_is_invalid() {
        let err = DeliveryDetails::from_slot(
            BuyerKind::Consumer,
            DeliverySlotId::new(5),
            Some(slot(DeliverySlotType::Pickup, false)),
            None,
            None,
        )
        .expect_err("inactive slot");
        assert_eq!(
            err,
            OrderValidationError::InvalidSlot {
                slot_id: DeliverySlotId::new(5),
                reason: SlotRejection::Inactive,
            }
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_home_slot_requires_address() {
        let err = DeliveryDetails::from_slot(
            BuyerKind::Consumer,
            DeliverySlotId::new(5),
            Some(slot(DeliverySlotType::Home, true)),
            None,
            None,
        )
        .expect_err("home needs address");
        assert_eq!(
            err,
            OrderValidationError::MissingDeliveryAddress(DeliveryKind::Home)
        );
    }

    #[test]
    fn test_pickup_slot_takes_date_and_label_from_slot() {
        let delivery = DeliveryDetails::from_slot(
            BuyerKind::Consumer,
            DeliverySlotId::new(5),
            Some(slot(DeliverySlotType::Pickup, true)),
            None,
            None,
        )
        .expect("valid pickup");
        assert_eq!(delivery.kind, DeliveryKind::Pickup);
        assert_eq!(delivery.date, date(2026, 3, 14));
        assert_eq!(delivery.time_label, "Sat 10:00-12:00");
        assert_eq!(delivery.slot_id, Some(DeliverySlotId::new(5)));
    }

    #[test]
    fn test_delivery_request_wire_format() {
        let json = r#"{"type":"route","date":"2026-03-14","time_slot":"12-14","address":"Kobe"}"#;
        let request: DeliveryRequest = serde_json::from_str(json).expect("deserialize");
        assert!(matches!(
            request,
            DeliveryRequest::Route {
                time_slot: DeliveryTimeSlot::Noon,
                notes: None,
                ..
            }
        ));

        let json = r#"{"type":"slot","slot_id":9}"#;
        let request: DeliveryRequest = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            request,
            DeliveryRequest::Slot {
                slot_id: DeliverySlotId::new(9),
                address: None,
                notes: None,
            }
        );
    }

    #[test]
    fn test_buyer_ref_display() {
        assert_eq!(BuyerRef::restaurant(3).to_string(), "restaurant:3");
    }
}
