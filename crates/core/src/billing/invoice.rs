//! Monthly invoice aggregation.
//!
//! Tax comes from what each order stored when it was priced, bucketed by
//! rate. Only orders that carry no line items fall back to splitting their
//! goods amount at a single flat rate; those are counted in
//! [`MonthlyInvoice::approximated_orders`] so the approximation stays visible.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::BillingPeriod;
use crate::order::{BuyerRef, Order};
use crate::pricing::{SHIPPING_TAX_RATE, split_tax_inclusive};
use crate::types::{OrderId, OrderStatus, TaxRate};

/// Taxable base and tax stored for one rate on one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxedAmount {
    pub rate: TaxRate,
    pub taxable: Decimal,
    pub tax: Decimal,
}

/// The parts of a committed order the invoice needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOrder {
    pub order_id: OrderId,
    pub delivery_date: NaiveDate,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_fee: Decimal,
    /// Stored per-line amounts; empty when the order has no lines on record.
    pub lines: Vec<TaxedAmount>,
}

impl From<&Order> for InvoiceOrder {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            delivery_date: order.delivery.date,
            status: order.status,
            total_amount: order.total_amount,
            shipping_fee: order.shipping_fee,
            lines: order
                .items
                .iter()
                .map(|item| TaxedAmount {
                    rate: item.tax_rate,
                    taxable: item.subtotal,
                    tax: item.tax_amount,
                })
                .collect(),
        }
    }
}

/// Orders delivered on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAmount {
    pub date: NaiveDate,
    pub order_count: u32,
    pub total_amount: Decimal,
}

/// Invoice totals for one tax rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBucket {
    pub rate: TaxRate,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
}

/// One buyer's invoice for one billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyInvoice {
    pub buyer: BuyerRef,
    pub period: BillingPeriod,
    /// Chronological, one entry per delivery date with at least one order.
    pub daily: Vec<DailyAmount>,
    pub order_count: u32,
    /// Tax-exclusive amount, shipping base included.
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    /// Tax-inclusive shipping billed in the period.
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
    /// Ascending by rate; rates with nothing billed are omitted.
    pub tax_breakdown: Vec<TaxBucket>,
    /// Orders whose tax was back-calculated at `fallback_rate`.
    pub approximated_orders: u32,
}

impl MonthlyInvoice {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_count == 0
    }
}

#[derive(Default)]
struct Bucket {
    taxable: Decimal,
    tax: Decimal,
}

/// Aggregate a buyer's orders into a monthly invoice.
///
/// `orders` may contain anything fetched for the buyer; cancelled orders and
/// orders delivered outside `period` are ignored here as well, so the result
/// only depends on the qualifying orders.
#[must_use]
pub fn aggregate_invoice(
    buyer: BuyerRef,
    period: BillingPeriod,
    orders: &[InvoiceOrder],
    fallback_rate: TaxRate,
) -> MonthlyInvoice {
    let mut daily: BTreeMap<NaiveDate, DailyAmount> = BTreeMap::new();
    let mut buckets: BTreeMap<TaxRate, Bucket> = BTreeMap::new();
    let mut order_count = 0_u32;
    let mut total_amount = Decimal::ZERO;
    let mut shipping_fee = Decimal::ZERO;
    let mut approximated_orders = 0_u32;

    let mut add = |rate: TaxRate, taxable: Decimal, tax: Decimal| {
        let bucket = buckets.entry(rate).or_default();
        bucket.taxable += taxable;
        bucket.tax += tax;
    };

    for order in orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled && period.contains(o.delivery_date))
    {
        let day = daily.entry(order.delivery_date).or_insert(DailyAmount {
            date: order.delivery_date,
            order_count: 0,
            total_amount: Decimal::ZERO,
        });
        day.order_count += 1;
        day.total_amount += order.total_amount;

        order_count += 1;
        total_amount += order.total_amount;
        shipping_fee += order.shipping_fee;

        let (base, tax) = split_inclusive(order.shipping_fee, SHIPPING_TAX_RATE);
        add(SHIPPING_TAX_RATE, base, tax);

        if order.lines.is_empty() {
            let goods = order.total_amount - order.shipping_fee;
            let (base, tax) = split_inclusive(goods, fallback_rate);
            add(fallback_rate, base, tax);
            approximated_orders += 1;
        } else {
            for line in &order.lines {
                add(line.rate, line.taxable, line.tax);
            }
        }
    }

    let tax_breakdown: Vec<TaxBucket> = buckets
        .into_iter()
        .filter(|(_, b)| !(b.taxable.is_zero() && b.tax.is_zero()))
        .map(|(rate, b)| TaxBucket {
            rate,
            taxable_amount: b.taxable,
            tax_amount: b.tax,
        })
        .collect();

    MonthlyInvoice {
        buyer,
        period,
        daily: daily.into_values().collect(),
        order_count,
        subtotal: tax_breakdown.iter().map(|b| b.taxable_amount).sum(),
        tax_amount: tax_breakdown.iter().map(|b| b.tax_amount).sum(),
        shipping_fee,
        total_amount,
        tax_breakdown,
        approximated_orders,
    }
}

/// Tax-inclusive split of a stored amount.
///
/// Whole-yen amounts use the integer split; anything else (negative or
/// fractional, which committed orders never hold) is split in decimals with
/// the same ceiling rule.
fn split_inclusive(amount: Decimal, rate: TaxRate) -> (Decimal, Decimal) {
    if amount.fract().is_zero()
        && let Some(whole) = amount.to_u64()
    {
        let split = split_tax_inclusive(whole, rate);
        return (Decimal::from(split.base), Decimal::from(split.tax));
    }

    let percent = Decimal::from(rate.percent());
    let base = (amount * Decimal::ONE_HUNDRED / (Decimal::ONE_HUNDRED + percent)).ceil();
    (base, amount - base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::resolve;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn yen(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn scenario_order(id: i32, day: NaiveDate) -> InvoiceOrder {
        InvoiceOrder {
            order_id: OrderId::new(id),
            delivery_date: day,
            status: OrderStatus::Delivered,
            total_amount: yen(944),
            shipping_fee: yen(400),
            lines: vec![
                TaxedAmount {
                    rate: TaxRate::Reduced,
                    taxable: yen(300),
                    tax: yen(24),
                },
                TaxedAmount {
                    rate: TaxRate::Standard,
                    taxable: yen(200),
                    tax: yen(20),
                },
            ],
        }
    }

    #[test]
    fn test_uses_stored_tax_and_splits_shipping() {
        let period = resolve(2026, 3, 99).expect("period");
        let orders = [scenario_order(1, date(2026, 3, 10))];
        let invoice = aggregate_invoice(BuyerRef::consumer(1), period, &orders, TaxRate::Standard);

        assert_eq!(invoice.order_count, 1);
        assert_eq!(invoice.total_amount, yen(944));
        // 24 + 20 on goods, 36 on shipping
        assert_eq!(invoice.tax_amount, yen(80));
        assert_eq!(invoice.subtotal, yen(864));
        assert_eq!(invoice.subtotal + invoice.tax_amount, invoice.total_amount);
        assert_eq!(
            invoice.tax_breakdown,
            vec![
                TaxBucket {
                    rate: TaxRate::Reduced,
                    taxable_amount: yen(300),
                    tax_amount: yen(24),
                },
                TaxBucket {
                    rate: TaxRate::Standard,
                    taxable_amount: yen(564),
                    tax_amount: yen(56),
                },
            ]
        );
        assert_eq!(invoice.approximated_orders, 0);
    }

    #[test]
    fn test_daily_entries_are_chronological_and_grouped() {
        let period = resolve(2026, 1, 20).expect("period");
        let orders = [
            scenario_order(1, date(2026, 1, 15)),
            scenario_order(2, date(2025, 12, 22)),
            scenario_order(3, date(2026, 1, 15)),
        ];
        let invoice =
            aggregate_invoice(BuyerRef::restaurant(1), period, &orders, TaxRate::Standard);

        assert_eq!(
            invoice.daily,
            vec![
                DailyAmount {
                    date: date(2025, 12, 22),
                    order_count: 1,
                    total_amount: yen(944),
                },
                DailyAmount {
                    date: date(2026, 1, 15),
                    order_count: 2,
                    total_amount: yen(1888),
                },
            ]
        );
        assert_eq!(invoice.total_amount, yen(2832));
    }

    #[test]
    fn test_excludes_cancelled_and_out_of_period_orders() {
        let period = resolve(2026, 1, 20).expect("period");
        let mut cancelled = scenario_order(1, date(2026, 1, 5));
        cancelled.status = OrderStatus::Cancelled;
        let orders = [
            cancelled,
            scenario_order(2, date(2026, 1, 21)),
            scenario_order(3, date(2025, 12, 20)),
        ];
        let invoice =
            aggregate_invoice(BuyerRef::restaurant(1), period, &orders, TaxRate::Standard);

        assert!(invoice.is_empty());
        assert!(invoice.daily.is_empty());
        assert!(invoice.tax_breakdown.is_empty());
        assert_eq!(invoice.total_amount, Decimal::ZERO);
    }

    #[test]
    fn test_orders_without_lines_fall_back_to_flat_rate() {
        let period = resolve(2026, 3, 99).expect("period");
        let orders = [InvoiceOrder {
            order_id: OrderId::new(9),
            delivery_date: date(2026, 3, 3),
            status: OrderStatus::Confirmed,
            total_amount: yen(1080),
            shipping_fee: Decimal::ZERO,
            lines: Vec::new(),
        }];
        let invoice = aggregate_invoice(BuyerRef::restaurant(1), period, &orders, TaxRate::Reduced);

        assert_eq!(invoice.approximated_orders, 1);
        assert_eq!(invoice.subtotal, yen(1000));
        assert_eq!(invoice.tax_amount, yen(80));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let period = resolve(2026, 3, 99).expect("period");
        let orders = [
            scenario_order(1, date(2026, 3, 2)),
            scenario_order(2, date(2026, 3, 9)),
        ];
        let first = aggregate_invoice(BuyerRef::consumer(4), period, &orders, TaxRate::Standard);
        let second = aggregate_invoice(BuyerRef::consumer(4), period, &orders, TaxRate::Standard);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fractional_amounts_split_in_decimals() {
        let (base, tax) = split_inclusive(Decimal::new(1101, 1), TaxRate::Standard);
        assert_eq!(base + tax, Decimal::new(1101, 1));
        assert_eq!(base, yen(101));
    }
}
