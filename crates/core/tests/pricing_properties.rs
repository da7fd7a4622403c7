//! Property-based tests for the money arithmetic.
//!
//! 1. **Order total**: `total == subtotal + tax + shipping` for any priced order
//! 2. **Line tax**: `tax == round_half_up(price × qty × rate / 100)`, deterministic
//! 3. **Inclusive split**: `base + tax == amount` for any amount and rate
//! 4. **Cancellation**: always refused once shipped, always allowed while pending

use chrono::{NaiveDate, Utc};
use farmlink_core::order::{BuyerRef, DeliveryDetails, OrderDraft, ProductSnapshot};
use farmlink_core::pricing::{compute_line, round_half_up, split_tax_inclusive};
use farmlink_core::{DeliveryKind, FarmerId, OrderId, OrderStatus, ProductId, TaxRate};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn tax_rate() -> impl Strategy<Value = TaxRate> {
    prop_oneof![Just(TaxRate::Reduced), Just(TaxRate::Standard)]
}

/// Prices with up to two decimal places, below one million yen.
fn price() -> impl Strategy<Value = Decimal> {
    (0_i64..100_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn delivery() -> DeliveryDetails {
    DeliveryDetails {
        kind: DeliveryKind::Home,
        date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date"),
        slot_id: None,
        time_label: "10:00-12:00".to_string(),
        address: Some("Sapporo".to_string()),
        notes: None,
    }
}

proptest! {
    #[test]
    fn prop_order_total_is_sum_of_parts(
        lines in prop::collection::vec((price(), tax_rate(), 1_i32..500), 1..20),
        shipping in 0_u64..5_000,
    ) {
        let mut draft = OrderDraft::new(BuyerRef::consumer(1), delivery(), shipping);
        for (index, (price, tax_rate, quantity)) in lines.iter().enumerate() {
            let product = ProductSnapshot {
                product_id: ProductId::new(i32::try_from(index).expect("small index")),
                name: "item".to_string(),
                unit: "pc".to_string(),
                price: *price,
                tax_rate: *tax_rate,
                is_active: true,
                farmer_id: Some(FarmerId::new(1)),
            };
            draft.add_line(*quantity, &product).expect("valid line");
        }

        let order = draft.finish().expect("non-empty order");
        prop_assert_eq!(
            order.total_amount,
            order.subtotal + order.tax_amount + order.shipping_fee
        );

        let line_tax: Decimal = order.lines.iter().map(|l| l.amounts.tax_amount).sum();
        prop_assert_eq!(order.tax_amount, line_tax);
    }

    #[test]
    fn prop_line_tax_is_rounded_once(
        price in price(),
        tax_rate in tax_rate(),
        quantity in 1_u32..1_000,
    ) {
        let line = compute_line(price, tax_rate, quantity);
        let expected = round_half_up(
            price * Decimal::from(quantity) * Decimal::from(tax_rate.percent()) / Decimal::ONE_HUNDRED,
        );

        prop_assert_eq!(line.tax_amount, expected);
        prop_assert_eq!(line.total, line.subtotal + line.tax_amount);
        prop_assert_eq!(compute_line(price, tax_rate, quantity), line);
    }

    #[test]
    fn prop_inclusive_split_adds_up(amount in any::<u64>(), rate in tax_rate()) {
        let split = split_tax_inclusive(amount, rate);
        prop_assert_eq!(split.base + split.tax, amount);
    }

    #[test]
    fn prop_inclusive_split_base_is_ceiling(amount in 0_u64..10_000_000, rate in tax_rate()) {
        let split = split_tax_inclusive(amount, rate);
        let divisor = 100 + u64::from(rate.percent());
        prop_assert_eq!(split.base, (amount * 100).div_ceil(divisor));
    }

    #[test]
    fn prop_cancel_depends_only_on_status(shipped in any::<bool>()) {
        let mut draft = OrderDraft::new(BuyerRef::restaurant(1), delivery(), 0);
        let product = ProductSnapshot {
            product_id: ProductId::new(1),
            name: "rice".to_string(),
            unit: "bag".to_string(),
            price: Decimal::from(3_000),
            tax_rate: TaxRate::Reduced,
            is_active: true,
            farmer_id: None,
        };
        draft.add_line(1, &product).expect("valid line");
        let mut order = draft
            .finish()
            .expect("non-empty order")
            .into_order(OrderId::new(1), std::iter::empty(), Utc::now());

        if shipped {
            order.transition(OrderStatus::Shipped, Utc::now()).expect("ship");
            prop_assert!(order.cancel(Utc::now()).is_err());
            prop_assert_eq!(order.status, OrderStatus::Shipped);
        } else {
            prop_assert!(order.cancel(Utc::now()).is_ok());
            prop_assert_eq!(order.status, OrderStatus::Cancelled);
        }
    }
}
