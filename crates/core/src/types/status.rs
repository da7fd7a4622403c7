//! Enumerations shared by orders, catalog snapshots and delivery slots.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Allowed moves are defined in [`crate::order`]; this type only names the
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses in lifecycle order, `Cancelled` last.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether no further transition may leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Snake-case name used on the wire and in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Which kind of account placed an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "buyer_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BuyerKind {
    /// B2B restaurant account, billed monthly against its closing day.
    Restaurant,
    /// B2C consumer account, ordering against published delivery slots.
    Consumer,
}

impl std::fmt::Display for BuyerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restaurant => write!(f, "restaurant"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

impl std::str::FromStr for BuyerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restaurant" => Ok(Self::Restaurant),
            "consumer" => Ok(Self::Consumer),
            _ => Err(format!("invalid buyer kind: {s}")),
        }
    }
}

/// Type of a published consumer delivery slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "delivery_slot_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySlotType {
    /// Delivered to the consumer's address.
    Home,
    /// Collected by the consumer at a pickup point.
    Pickup,
}

/// How an order reaches its buyer; the key of the shipping fee table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "delivery_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Scheduled restaurant route delivery.
    Route,
    /// Consumer home delivery slot.
    Home,
    /// Consumer pickup slot.
    Pickup,
}

impl From<DeliverySlotType> for DeliveryKind {
    fn from(slot_type: DeliverySlotType) -> Self {
        match slot_type {
            DeliverySlotType::Home => Self::Home,
            DeliverySlotType::Pickup => Self::Pickup,
        }
    }
}

impl DeliveryKind {
    /// Human readable label used in buyer messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Route => "Restaurant delivery",
            Self::Home => "Home delivery",
            Self::Pickup => "Pickup",
        }
    }
}

/// Delivery time windows offered on restaurant routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryTimeSlot {
    #[serde(rename = "12-14")]
    Noon,
    #[serde(rename = "14-16")]
    Afternoon,
    #[serde(rename = "16-18")]
    Evening,
}

impl DeliveryTimeSlot {
    /// Display form, e.g. `12:00-14:00`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Noon => "12:00-14:00",
            Self::Afternoon => "14:00-16:00",
            Self::Evening => "16:00-18:00",
        }
    }
}

/// Consumption tax rate applied to a product.
///
/// Food is sold at the reduced rate; everything else, shipping included, at
/// the standard rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TaxRate {
    /// 8 %
    Reduced,
    /// 10 %
    Standard,
}

impl TaxRate {
    /// Rate in whole percent.
    #[must_use]
    pub const fn percent(self) -> u32 {
        match self {
            Self::Reduced => 8,
            Self::Standard => 10,
        }
    }
}

impl TryFrom<u32> for TaxRate {
    type Error = String;

    fn try_from(percent: u32) -> Result<Self, Self::Error> {
        match percent {
            8 => Ok(Self::Reduced),
            10 => Ok(Self::Standard),
            _ => Err(format!("unsupported tax rate: {percent}%")),
        }
    }
}

impl TryFrom<i32> for TaxRate {
    type Error = String;

    fn try_from(percent: i32) -> Result<Self, Self::Error> {
        u32::try_from(percent)
            .map_err(|_| format!("unsupported tax rate: {percent}%"))
            .and_then(Self::try_from)
    }
}

impl From<TaxRate> for u32 {
    fn from(rate: TaxRate) -> Self {
        rate.percent()
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}
