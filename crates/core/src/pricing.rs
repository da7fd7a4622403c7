//! Tax and pricing arithmetic.
//!
//! All functions are pure. Amounts are yen held in [`Decimal`] so catalog
//! prices with fractional parts multiply exactly; tax is rounded to whole yen
//! once per line and never re-rounded when lines are summed.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{DeliveryKind, TaxRate};

/// Rate used to split tax-inclusive shipping fees.
pub const SHIPPING_TAX_RATE: TaxRate = TaxRate::Standard;

/// Priced amounts for a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    /// `unit_price × quantity`, exact.
    pub subtotal: Decimal,
    /// Tax on the subtotal, rounded half-up to whole yen.
    pub tax_amount: Decimal,
    /// `subtotal + tax_amount`.
    pub total: Decimal,
}

/// Tax-exclusive base and tax component of a tax-inclusive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSplit {
    pub base: u64,
    pub tax: u64,
}

/// Round to whole yen, halves away from zero.
///
/// Tax amounts are never negative, so this is the usual half-up rule.
#[must_use]
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Price one order line.
///
/// Callers validate `quantity > 0` and a non-negative price before calling;
/// the calculator itself does not reject anything.
#[must_use]
pub fn compute_line(unit_price: Decimal, tax_rate: TaxRate, quantity: u32) -> LineAmounts {
    let subtotal = unit_price * Decimal::from(quantity);
    let tax_amount =
        round_half_up(subtotal * Decimal::from(tax_rate.percent()) / Decimal::ONE_HUNDRED);

    LineAmounts {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
    }
}

/// Split a tax-inclusive amount into `base = ceil(amount / (1 + rate))` and
/// `tax = amount - base`.
///
/// Integer arithmetic only: `ceil(a·100 / d) = a - floor(a·r / d)` with
/// `d = 100 + r`, evaluated without overflow for any `u64`.
#[must_use]
pub fn split_tax_inclusive(amount: u64, rate: TaxRate) -> TaxSplit {
    let percent = u64::from(rate.percent());
    let divisor = 100 + percent;
    let tax = (amount / divisor) * percent + (amount % divisor) * percent / divisor;

    TaxSplit {
        base: amount - tax,
        tax,
    }
}

/// Flat, tax-inclusive shipping fees keyed by delivery kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingFeeTable {
    /// Scheduled restaurant route delivery.
    pub route: u64,
    /// Consumer home delivery.
    pub home: u64,
    /// Consumer pickup.
    pub pickup: u64,
}

impl Default for ShippingFeeTable {
    fn default() -> Self {
        Self {
            route: 0,
            home: 400,
            pickup: 0,
        }
    }
}

impl ShippingFeeTable {
    /// Fee charged for a delivery kind.
    #[must_use]
    pub const fn fee_for(&self, kind: DeliveryKind) -> u64 {
        match kind {
            DeliveryKind::Route => self.route,
            DeliveryKind::Home => self.home,
            DeliveryKind::Pickup => self.pickup,
        }
    }
}
