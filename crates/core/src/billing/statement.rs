//! Farmer sales statements.
//!
//! The counterpart of the buyer invoice: everything one farmer supplied in a
//! period, grouped by delivery date.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BillingPeriod;
use crate::types::{FarmerId, OrderId, OrderStatus, TaxRate};

/// A committed line item supplied by the farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmerSaleLine {
    pub order_id: OrderId,
    pub delivery_date: NaiveDate,
    pub status: OrderStatus,
    pub product_name: String,
    pub product_unit: String,
    pub quantity: u32,
    pub tax_rate: TaxRate,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDay {
    pub date: NaiveDate,
    pub lines: Vec<FarmerSaleLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmerStatement {
    pub farmer_id: FarmerId,
    pub period: BillingPeriod,
    pub days: Vec<StatementDay>,
    /// Distinct orders contributing at least one line.
    pub order_count: u32,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Build a farmer's statement; cancelled and out-of-period lines are dropped.
#[must_use]
pub fn aggregate_statement(
    farmer_id: FarmerId,
    period: BillingPeriod,
    lines: &[FarmerSaleLine],
) -> FarmerStatement {
    let mut days: BTreeMap<NaiveDate, StatementDay> = BTreeMap::new();
    let mut orders = BTreeSet::new();

    for line in lines
        .iter()
        .filter(|l| l.status != OrderStatus::Cancelled && period.contains(l.delivery_date))
    {
        orders.insert(line.order_id);

        let day = days.entry(line.delivery_date).or_insert_with(|| StatementDay {
            date: line.delivery_date,
            lines: Vec::new(),
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        });
        day.subtotal += line.subtotal;
        day.tax_amount += line.tax_amount;
        day.total_amount += line.total_amount;
        day.lines.push(line.clone());
    }

    let days: Vec<StatementDay> = days.into_values().collect();

    FarmerStatement {
        farmer_id,
        period,
        order_count: u32::try_from(orders.len()).unwrap_or(u32::MAX),
        subtotal: days.iter().map(|d| d.subtotal).sum(),
        tax_amount: days.iter().map(|d| d.tax_amount).sum(),
        total_amount: days.iter().map(|d| d.total_amount).sum(),
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::resolve;

    fn line(order: i32, day: u32, subtotal: i64, tax: i64) -> FarmerSaleLine {
        FarmerSaleLine {
            order_id: OrderId::new(order),
            delivery_date: NaiveDate::from_ymd_opt(2026, 4, day).expect("valid date"),
            status: OrderStatus::Delivered,
            product_name: "Tomato".to_string(),
            product_unit: "kg".to_string(),
            quantity: 1,
            tax_rate: TaxRate::Reduced,
            subtotal: Decimal::from(subtotal),
            tax_amount: Decimal::from(tax),
            total_amount: Decimal::from(subtotal + tax),
        }
    }

    #[test]
    fn test_groups_lines_by_day() {
        let period = resolve(2026, 4, 99).expect("period");
        let lines = [line(1, 12, 300, 24), line(2, 3, 100, 8), line(1, 12, 200, 16)];
        let statement = aggregate_statement(FarmerId::new(5), period, &lines);

        assert_eq!(statement.days.len(), 2);
        let [first, second] = statement.days.as_slice() else {
            panic!("expected two days, got {:?}", statement.days);
        };
        assert_eq!(first.date.to_string(), "2026-04-03");
        assert_eq!(second.lines.len(), 2);
        assert_eq!(second.total_amount, Decimal::from(540));
        assert_eq!(statement.order_count, 2);
        assert_eq!(statement.subtotal, Decimal::from(600));
        assert_eq!(statement.tax_amount, Decimal::from(48));
        assert_eq!(statement.total_amount, Decimal::from(648));
    }

    #[test]
    fn test_skips_cancelled_lines() {
        let period = resolve(2026, 4, 99).expect("period");
        let mut cancelled = line(3, 10, 500, 40);
        cancelled.status = OrderStatus::Cancelled;
        let statement = aggregate_statement(FarmerId::new(5), period, &[cancelled]);

        assert!(statement.days.is_empty());
        assert_eq!(statement.order_count, 0);
        assert_eq!(statement.total_amount, Decimal::ZERO);
    }
}
