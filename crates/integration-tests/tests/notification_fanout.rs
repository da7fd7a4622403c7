//! LINE fan-out for committed orders and invoice notices.

use std::time::Duration;

use farmlink_core::billing::TargetMonth;
use farmlink_core::order::{CreateOrderRequest, Order};
use farmlink_core::pricing::ShippingFeeTable;
use farmlink_integration_tests::{
    AOKI, BISTRO, CANTEEN, CHIBA, HOUSE_RICE, InMemoryMarket, KNIFE, LEEK, PICKUP_SLOT, RecordingChannel,
    RecordingNotifier, SATO, SPINACH, TOMATO, channels, date, market, route_order, slot_order,
};
use farmlink_server::line::ChannelTokenCache;
use farmlink_server::notifications::{DeliveryOutcome, DispatchReport, NotificationDispatcher};
use farmlink_server::services::{BillingService, OrderService};

type Dispatcher = NotificationDispatcher<RecordingChannel, InMemoryMarket>;

fn dispatcher(
    market: &InMemoryMarket,
    channel: &RecordingChannel,
    test_user_id: Option<&str>,
) -> Dispatcher {
    let (buyer_channel, producer_channel) = channels();
    NotificationDispatcher::new(
        ChannelTokenCache::new(channel.clone()),
        market.clone(),
        buyer_channel,
        producer_channel,
        test_user_id.map(str::to_string),
    )
}

/// Store an order without sending anything.
async fn place(market: &InMemoryMarket, request: CreateOrderRequest) -> Order {
    OrderService::new(
        market.clone(),
        market.clone(),
        RecordingNotifier::new(),
        ShippingFeeTable::default(),
    )
    .create_order(request)
    .await
    .expect("order created")
}

const fn report(sent: usize, skipped: usize, failed: usize) -> DispatchReport {
    DispatchReport {
        sent,
        skipped,
        failed,
    }
}

#[tokio::test]
async fn test_two_lines_of_one_farmer_make_one_message() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 3), (KNIFE, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(2, 0, 0));

    let farmer = channel.pushed_to("U-aoki");
    assert_eq!(farmer.len(), 1);
    let harvest = &farmer.first().expect("farmer message").text;
    assert!(harvest.contains("Hi Aoki Farm"));
    assert!(harvest.contains("- Tomato"));
    assert!(harvest.contains("- Knife"));
    assert!(harvest.contains("Projected sales: ¥544"));
    assert!(
        farmer
            .iter()
            .all(|p| p.access_token.starts_with("producer-channel-token"))
    );

    let buyer = channel.pushed_to("U-bistro");
    assert_eq!(buyer.len(), 1);
    let confirmation = buyer.first().expect("buyer message");
    assert!(confirmation.text.contains("Tomato (Aoki Farm)"));
    assert!(confirmation.text.contains(&format!("Order No. {}", order.id)));
    assert!(confirmation.access_token.starts_with("buyer-channel-token"));
}

#[tokio::test]
async fn test_farmer_without_line_account_is_skipped() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 1), (LEEK, 2)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(2, 1, 0));
    assert_eq!(channel.pushed().len(), 2);
    assert_eq!(channel.pushed_to("U-aoki").len(), 1);
}

#[tokio::test]
async fn test_platform_products_only_reach_the_buyer() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(HOUSE_RICE, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(1, 0, 0));
    let buyer = channel.pushed_to("U-bistro");
    assert!(
        buyer
            .first()
            .is_some_and(|p| p.text.contains("Rice (Farmlink)"))
    );
}

#[tokio::test]
async fn test_unlinked_buyer_falls_back_to_test_user() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(
        &market,
        route_order(CANTEEN, date(2026, 3, 4), &[(SPINACH, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, Some("U-test"))
        .deliver(&order)
        .await;

    assert_eq!(outcome, report(2, 0, 0));
    assert_eq!(channel.pushed_to("U-test").len(), 1);
    assert_eq!(channel.pushed_to("U-baba").len(), 1);
}

#[tokio::test]
async fn test_unlinked_buyer_without_test_user_is_skipped() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(
        &market,
        route_order(CANTEEN, date(2026, 3, 4), &[(SPINACH, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(1, 1, 0));
    assert_eq!(channel.pushed_to("U-baba").len(), 1);
}

#[tokio::test]
async fn test_consumer_confirmation_uses_consumer_text() {
    let market = market();
    let channel = RecordingChannel::new();
    let order = place(&market, slot_order(SATO, PICKUP_SLOT, None, &[(SPINACH, 2)])).await;

    dispatcher(&market, &channel, None).deliver(&order).await;

    let buyer = channel.pushed_to("U-sato");
    let text = &buyer.first().expect("consumer message").text;
    assert!(text.starts_with("Dear Sato,"));
    assert!(text.contains("- Spinach x 2"));
    assert!(text.contains("[Shipping] ¥0 (Pickup)"));
    assert!(text.contains("[Total] ¥324"));

    let farmer = channel.pushed_to("U-baba");
    assert!(
        farmer
            .first()
            .is_some_and(|p| p.text.contains("an order from a consumer"))
    );
}

#[tokio::test]
async fn test_one_failed_push_does_not_stop_the_others() {
    let market = market();
    let channel = RecordingChannel::new();
    channel.fail_recipient("U-aoki");
    let order = place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 1), (SPINACH, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(2, 0, 1));
    assert_eq!(channel.pushed_to("U-bistro").len(), 1);
    assert_eq!(channel.pushed_to("U-baba").len(), 1);
}

#[tokio::test]
async fn test_failed_token_exchange_fails_only_that_channel() {
    let market = market();
    let channel = RecordingChannel::new();
    channel.fail_channel("producer-channel");
    let order = place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 1), (SPINACH, 1)]),
    )
    .await;

    let outcome = dispatcher(&market, &channel, None).deliver(&order).await;

    assert_eq!(outcome, report(1, 0, 2));
    assert_eq!(channel.pushed_to("U-bistro").len(), 1);
}

#[tokio::test]
async fn test_tokens_are_exchanged_once_per_channel() {
    let market = market();
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(&market, &channel, None);

    for day in [4, 5] {
        let order = place(
            &market,
            route_order(BISTRO, date(2026, 3, day), &[(TOMATO, 1)]),
        )
        .await;
        dispatcher.deliver(&order).await;
    }

    assert_eq!(channel.exchanges(), 2);
    assert_eq!(channel.pushed().len(), 4);
}

#[tokio::test]
async fn test_order_creation_does_not_wait_for_delivery() {
    let market = market();
    let channel = RecordingChannel::new();
    let service = OrderService::new(
        market.clone(),
        market.clone(),
        dispatcher(&market, &channel, None),
        ShippingFeeTable::default(),
    );

    service
        .create_order(route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 1)]))
        .await
        .expect("order created");

    let mut waited = Duration::ZERO;
    while channel.pushed().len() < 2 && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(channel.pushed().len(), 2);
}

#[tokio::test]
async fn test_invoice_notice_links_the_document() {
    let market = market();
    let channel = RecordingChannel::new();
    place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 3)]),
    )
    .await;

    let billing = BillingService::new(
        market.clone(),
        market.clone(),
        dispatcher(&market, &channel, None),
    );
    let month: TargetMonth = "2026-03".parse().expect("month");

    let (invoice, outcome) = billing
        .notify_invoice_ready(BISTRO, month, "https://files.example.com/invoices/2026-03.pdf")
        .await
        .expect("notice sent");

    assert_eq!(outcome, DeliveryOutcome::Sent);
    assert_eq!(invoice.order_count, 1);

    let pushed = channel.pushed_to("U-bistro");
    let text = &pushed.first().expect("invoice message").text;
    assert!(text.contains("https://files.example.com/invoices/2026-03.pdf"));
    assert!(text.contains("Period: 2026-02-21 to 2026-03-20"));
    assert!(text.contains("Total: ¥324 (tax incl.)"));
}

#[tokio::test]
async fn test_payment_notice_goes_to_the_farmer_on_the_producer_channel() {
    let market = market();
    let channel = RecordingChannel::new();
    place(
        &market,
        route_order(BISTRO, date(2026, 3, 4), &[(TOMATO, 3), (SPINACH, 1)]),
    )
    .await;

    let billing = BillingService::new(
        market.clone(),
        market.clone(),
        dispatcher(&market, &channel, None),
    );
    let month: TargetMonth = "2026-03".parse().expect("month");

    let (statement, outcome) = billing
        .notify_statement_ready(AOKI, month, "https://files.example.com/payments/aoki-2026-03.pdf")
        .await
        .expect("notice sent");

    assert_eq!(outcome, DeliveryOutcome::Sent);
    assert_eq!(statement.order_count, 1);

    let pushed = channel.pushed_to("U-aoki");
    assert_eq!(pushed.len(), 1);
    let notice = pushed.first().expect("payment notice");
    assert!(notice.access_token.starts_with("producer-channel-token"));
    assert!(notice.text.contains("Hi Aoki Farm"));
    assert!(notice.text.contains("payment notice for March 2026"));
    assert!(notice.text.contains("Sales: ¥324 (tax incl.)"));
    assert!(
        notice
            .text
            .contains("https://files.example.com/payments/aoki-2026-03.pdf")
    );
    assert!(channel.pushed_to("U-baba").is_empty());
}

#[tokio::test]
async fn test_payment_notice_never_falls_back_to_test_user() {
    let market = market();
    let channel = RecordingChannel::new();
    let billing = BillingService::new(
        market.clone(),
        market.clone(),
        dispatcher(&market, &channel, Some("U-test")),
    );
    let month: TargetMonth = "2026-03".parse().expect("month");

    let (_, outcome) = billing
        .notify_statement_ready(CHIBA, month, "https://files.example.com/payments/chiba.pdf")
        .await
        .expect("statement built");

    assert_eq!(outcome, DeliveryOutcome::Skipped);
    assert!(channel.pushed().is_empty());
    assert_eq!(channel.exchanges(), 0);
}
