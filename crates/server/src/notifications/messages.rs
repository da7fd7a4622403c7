//! Message texts pushed to buyers and farmers.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::fmt::Write as _;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use farmlink_core::billing::{FarmerStatement, MonthlyInvoice};
use farmlink_core::order::{Order, OrderLineItem};
use farmlink_core::pricing::round_half_up;
use farmlink_core::{BuyerKind, DeliveryKind, FarmerId};

/// Whole yen with thousands separators, e.g. `¥12,345`.
#[must_use]
pub fn format_yen(amount: Decimal) -> String {
    let whole = round_half_up(amount);
    let digits = whole.normalize().abs().to_string();
    let sign = if whole.is_sign_negative() && !whole.is_zero() {
        "-"
    } else {
        ""
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}¥{grouped}")
}

/// Short delivery date, e.g. `Wed Mar 4`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%a %b %-d").to_string()
}

/// Confirmation for whoever placed the order.
#[must_use]
pub fn buyer_confirmation<S: BuildHasher>(
    order: &Order,
    buyer_name: Option<&str>,
    farmer_names: &HashMap<FarmerId, String, S>,
) -> String {
    match order.buyer.kind {
        BuyerKind::Restaurant => restaurant_confirmation(order, farmer_names),
        BuyerKind::Consumer => consumer_confirmation(order, buyer_name),
    }
}

/// Restaurant confirmation: delivery window and every item with its farmer.
#[must_use]
pub fn restaurant_confirmation<S: BuildHasher>(
    order: &Order,
    farmer_names: &HashMap<FarmerId, String, S>,
) -> String {
    let mut items = String::new();
    for item in &order.items {
        let farmer = item
            .farmer_id
            .and_then(|id| farmer_names.get(&id))
            .map_or("Farmlink", String::as_str);
        let _ = writeln!(items, "- {} ({farmer})", item.product_name);
        let _ = writeln!(items, "  Qty: {}{}", item.quantity, item.product_unit);
        let _ = writeln!(items, "  Amount: {}", format_yen(item.total_amount));
    }

    format!(
        "Thank you for your order!\n\
         We have passed it on to the farmers.\n\
         \n\
         Delivery\n\
         {date} {time}\n\
         \n\
         Order No. {id}\n\
         ------------------------\n\
         {items}\
         ------------------------\n\
         Total: {total} (tax incl.)",
        date = format_date(order.delivery.date),
        time = order.delivery.time_label,
        id = order.id,
        total = format_yen(order.total_amount),
    )
}

/// Consumer confirmation: items, amounts and where to receive the order.
#[must_use]
pub fn consumer_confirmation(order: &Order, buyer_name: Option<&str>) -> String {
    let mut items = String::new();
    for item in &order.items {
        let _ = writeln!(items, "- {} x {}", item.product_name, item.quantity);
    }

    let label = order.delivery.kind.label();
    let place = match order.delivery.kind {
        DeliveryKind::Home => "Your address",
        DeliveryKind::Pickup | DeliveryKind::Route => label,
    };

    format!(
        "Dear {name}, thank you for ordering with Farmlink.\n\
         \n\
         Your order\n\
         {items}\
         [Items] {subtotal}\n\
         [Shipping] {shipping} ({label})\n\
         [Total] {total}\n\
         \n\
         Receiving\n\
         When: {date} {time}\n\
         Where: {place}\n\
         \n\
         Please pay in cash on receipt.",
        name = buyer_name.unwrap_or("customer"),
        subtotal = format_yen(order.subtotal + order.tax_amount),
        shipping = format_yen(order.shipping_fee),
        total = format_yen(order.total_amount),
        date = format_date(order.delivery.date),
        time = order.delivery.time_label,
    )
}

/// Harvest list for one farmer, covering only the lines they supply.
#[must_use]
pub fn farmer_harvest_list(
    order: &Order,
    farmer_name: &str,
    lines: &[&OrderLineItem],
) -> String {
    let mut items = String::new();
    for line in lines {
        let _ = writeln!(items, "- {}", line.product_name);
        let _ = writeln!(items, "  Qty: {}{}", line.quantity, line.product_unit);
    }
    let projected: Decimal = lines.iter().map(|l| l.total_amount).sum();

    let buyer = match order.buyer.kind {
        BuyerKind::Restaurant => "a restaurant",
        BuyerKind::Consumer => "a consumer",
    };

    format!(
        "New order received!\n\
         Hi {farmer_name}, you have an order from {buyer}.\n\
         Please get the harvest ready for shipping.\n\
         \n\
         Delivery\n\
         {date} {time}\n\
         \n\
         Harvest list\n\
         {items}\
         ------------------------\n\
         Projected sales: {total}\n\
         ------------------------",
        date = format_date(order.delivery.date),
        time = order.delivery.time_label,
        total = format_yen(projected),
    )
}

/// Link to a rendered monthly invoice.
#[must_use]
pub fn invoice_ready(invoice: &MonthlyInvoice, document_url: &str) -> String {
    format!(
        "Your monthly invoice is ready.\n\
         Period: {period}\n\
         Total: {total} (tax incl.)\n\
         \n\
         Download it here:\n\
         {document_url}\n\
         \n\
         The link does not expire, but please save a copy soon.",
        period = invoice.period,
        total = format_yen(invoice.total_amount),
    )
}

/// Link to a farmer's rendered payment notice.
#[must_use]
pub fn payment_notice(statement: &FarmerStatement, farmer_name: &str, document_url: &str) -> String {
    format!(
        "Your payment notice is ready.\n\
         Hi {farmer_name}, here is the payment notice for {month}.\n\
         Period: {period}\n\
         Sales: {total} (tax incl.)\n\
         \n\
         Download it here:\n\
         {document_url}\n\
         \n\
         The link does not expire, but please save a copy soon.",
        month = statement.period.end_date.format("%B %Y"),
        period = statement.period,
        total = format_yen(statement.total_amount),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use farmlink_core::billing::{BillingPeriod, ClosingDay, aggregate_statement};
    use farmlink_core::order::{BuyerRef, DeliveryDetails};
    use farmlink_core::{OrderId, OrderItemId, OrderStatus, ProductId, TaxRate};

    use super::*;

    fn item(id: i32, farmer: Option<i32>, name: &str, total: Decimal) -> OrderLineItem {
        OrderLineItem {
            id: OrderItemId::new(id),
            order_id: OrderId::new(7),
            product_id: ProductId::new(id),
            farmer_id: farmer.map(FarmerId::new),
            product_name: name.to_string(),
            product_unit: "kg".to_string(),
            unit_price: total,
            tax_rate: TaxRate::Reduced,
            quantity: 2,
            subtotal: total,
            tax_amount: Decimal::ZERO,
            total_amount: total,
        }
    }

    fn order(buyer: BuyerRef, kind: DeliveryKind) -> Order {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("time");
        Order {
            id: OrderId::new(7),
            buyer,
            status: OrderStatus::Pending,
            subtotal: Decimal::from(1000),
            tax_amount: Decimal::from(80),
            shipping_fee: Decimal::from(400),
            total_amount: Decimal::from(1480),
            delivery: DeliveryDetails {
                kind,
                date: NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"),
                slot_id: None,
                time_label: "12:00-14:00".to_string(),
                address: Some("1-2-3 Kobe".to_string()),
                notes: None,
            },
            items: vec![
                item(1, Some(10), "Carrot", Decimal::from(540)),
                item(2, Some(11), "Tomato", Decimal::from(540)),
            ],
            version: 1,
            created_at: at,
            updated_at: at,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_format_yen_groups_thousands() {
        assert_eq!(format_yen(Decimal::from(0)), "¥0");
        assert_eq!(format_yen(Decimal::from(944)), "¥944");
        assert_eq!(format_yen(Decimal::new(100_000, 2)), "¥1,000");
        assert_eq!(format_yen(Decimal::from(1234567)), "¥1,234,567");
        assert_eq!(format_yen(Decimal::from(-1500)), "-¥1,500");
    }

    #[test]
    fn test_format_yen_rounds_halves_up() {
        assert_eq!(format_yen(Decimal::new(25, 1)), "¥3");
        assert_eq!(format_yen(Decimal::new(35, 1)), "¥4");
        assert_eq!(format_yen(Decimal::new(9995, 1)), "¥1,000");
        assert_eq!(format_yen(Decimal::new(24, 1)), "¥2");
    }

    #[test]
    fn test_payment_notice_links_document() {
        let period = BillingPeriod::resolve("2026-03".parse().expect("month"), ClosingDay::END_OF_MONTH)
            .expect("period");
        let statement = aggregate_statement(FarmerId::new(10), period, &[]);

        let text = payment_notice(&statement, "Tanaka Farm", "https://files.example.com/pay.pdf");

        assert!(text.contains("Hi Tanaka Farm"));
        assert!(text.contains("payment notice for March 2026"));
        assert!(text.contains("Period: 2026-03-01 to 2026-03-31"));
        assert!(text.contains("Sales: ¥0 (tax incl.)"));
        assert!(text.contains("https://files.example.com/pay.pdf"));
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).expect("date");
        assert_eq!(format_date(date), "Wed Mar 4");
    }

    #[test]
    fn test_restaurant_confirmation_names_farmers() {
        let order = order(BuyerRef::restaurant(3), DeliveryKind::Route);
        let names = HashMap::from([(FarmerId::new(10), "Tanaka Farm".to_string())]);

        let text = buyer_confirmation(&order, Some("Bistro"), &names);

        assert!(text.contains("Order No. 7"));
        assert!(text.contains("- Carrot (Tanaka Farm)"));
        // Unknown farmers fall back to the platform name.
        assert!(text.contains("- Tomato (Farmlink)"));
        assert!(text.contains("Total: ¥1,480 (tax incl.)"));
        assert!(text.contains("Wed Mar 4 12:00-14:00"));
    }

    #[test]
    fn test_consumer_confirmation_shows_shipping_and_place() {
        let order = order(BuyerRef::consumer(5), DeliveryKind::Home);

        let text = buyer_confirmation(&order, Some("Sato"), &HashMap::new());

        assert!(text.starts_with("Dear Sato,"));
        assert!(text.contains("- Carrot x 2"));
        assert!(text.contains("[Items] ¥1,080"));
        assert!(text.contains("[Shipping] ¥400 (Home delivery)"));
        assert!(text.contains("Where: Your address"));
    }

    #[test]
    fn test_harvest_list_only_has_given_lines() {
        let order = order(BuyerRef::restaurant(3), DeliveryKind::Route);
        let mine: Vec<&OrderLineItem> = order
            .items
            .iter()
            .filter(|i| i.farmer_id == Some(FarmerId::new(10)))
            .collect();

        let text = farmer_harvest_list(&order, "Tanaka Farm", &mine);

        assert!(text.contains("Hi Tanaka Farm"));
        assert!(text.contains("from a restaurant"));
        assert!(text.contains("- Carrot"));
        assert!(!text.contains("Tomato"));
        assert!(text.contains("Projected sales: ¥540"));
    }
}
