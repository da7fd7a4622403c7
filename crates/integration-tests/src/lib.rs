//! Scenario tests for the Farmlink services.
//!
//! The services run against the in-memory collaborators below instead of
//! `PostgreSQL` and the LINE API, so every test is self-contained:
//!
//! ```bash
//! cargo test -p farmlink-integration-tests
//! ```
//!
//! - [`InMemoryMarket`] - catalog, order store and account directory
//! - [`RecordingChannel`] - messaging channel that records every push
//! - [`RecordingNotifier`] - notifier that records what it was handed
//!
//! [`market`] seeds the catalog every scenario starts from.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};

use farmlink_core::billing::{
    BillingPeriod, ClosingDay, FarmerSaleLine, FarmerStatement, MonthlyInvoice,
};
use farmlink_core::order::{
    BuyerRef, CreateOrderRequest, DeliveryRequest, DeliverySlot, NewOrder, Order, OrderItemRequest,
    ProductSnapshot,
};
use farmlink_core::{
    DeliverySlotId, DeliverySlotType, DeliveryTimeSlot, FarmerId, OrderId, OrderItemId,
    OrderStatus, ProductId, TaxRate,
};
use farmlink_server::db::{
    BuyerProfile, Catalog, Directory, FarmerProfile, OrderStore, RepositoryError,
};
use farmlink_server::line::{ChannelCredentials, IssuedToken, LineError, MessagingChannel};
use farmlink_server::notifications::{DeliveryOutcome, Notifier};

// =============================================================================
// In-memory market
// =============================================================================

#[derive(Default)]
struct MarketState {
    products: HashMap<ProductId, ProductSnapshot>,
    slots: HashMap<DeliverySlotId, DeliverySlot>,
    buyers: HashMap<BuyerRef, BuyerProfile>,
    farmers: HashMap<FarmerId, FarmerProfile>,
    orders: HashMap<OrderId, Order>,
    next_order_id: i32,
    next_item_id: i32,
    fail_inserts: bool,
}

/// Catalog, order store and directory sharing one lock.
///
/// Clones share state, so one market can back several services.
#[derive(Clone, Default)]
pub struct InMemoryMarket {
    state: Arc<Mutex<MarketState>>,
}

impl InMemoryMarket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_product(&self, product: ProductSnapshot) {
        self.lock().products.insert(product.product_id, product);
    }

    pub fn add_slot(&self, slot: DeliverySlot) {
        self.lock().slots.insert(slot.id, slot);
    }

    pub fn add_buyer(&self, profile: BuyerProfile) {
        self.lock().buyers.insert(profile.buyer, profile);
    }

    pub fn add_farmer(&self, profile: FarmerProfile) {
        self.lock().farmers.insert(profile.id, profile);
    }

    /// Change a catalog price after orders were placed.
    pub fn set_price(&self, product_id: ProductId, price: Decimal) {
        self.lock()
            .products
            .entry(product_id)
            .and_modify(|product| product.price = price);
    }

    /// Make every following insert fail with a database error.
    pub fn fail_inserts(&self) {
        self.lock().fail_inserts = true;
    }

    /// Drop an order's stored lines, as for orders imported without them.
    pub fn clear_items(&self, id: OrderId) {
        self.lock()
            .orders
            .entry(id)
            .and_modify(|order| order.items.clear());
    }

    /// Bump the stored version as a concurrent writer would.
    pub fn touch(&self, id: OrderId) {
        self.lock()
            .orders
            .entry(id)
            .and_modify(|order| order.version += 1);
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }
}

impl Catalog for InMemoryMarket {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn delivery_slot(
        &self,
        id: DeliverySlotId,
    ) -> Result<Option<DeliverySlot>, RepositoryError> {
        Ok(self.lock().slots.get(&id).cloned())
    }
}

impl OrderStore for InMemoryMarket {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.lock();
        if state.fail_inserts {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let first_item = state.next_item_id + 1;
        let line_count = i32::try_from(order.lines.len())
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        state.next_item_id += line_count;

        let order = order.into_order(
            id,
            (first_item..first_item + line_count).map(OrderItemId::new),
            Utc::now(),
        );
        state.orders.insert(id, order.clone());
        drop(state);
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    async fn save_status(&self, order: &Order) -> Result<i32, RepositoryError> {
        let mut state = self.lock();
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;

        if stored.version != order.version {
            return Err(RepositoryError::Conflict(format!(
                "order {} is at version {}",
                order.id, stored.version
            )));
        }

        let version = stored.version + 1;
        *stored = Order {
            version,
            ..order.clone()
        };
        drop(state);
        Ok(version)
    }

    async fn orders_for_buyer(
        &self,
        buyer: BuyerRef,
        period: BillingPeriod,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| {
                o.buyer == buyer
                    && o.status != OrderStatus::Cancelled
                    && period.contains(o.delivery.date)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.delivery.date, o.id));
        Ok(orders)
    }

    async fn farmer_sales(
        &self,
        farmer: FarmerId,
        period: BillingPeriod,
    ) -> Result<Vec<FarmerSaleLine>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| o.status != OrderStatus::Cancelled && period.contains(o.delivery.date))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.delivery.date, o.id));

        Ok(orders
            .iter()
            .flat_map(|order| {
                order
                    .items
                    .iter()
                    .filter(|item| item.farmer_id == Some(farmer))
                    .map(|item| FarmerSaleLine {
                        order_id: order.id,
                        delivery_date: order.delivery.date,
                        status: order.status,
                        product_name: item.product_name.clone(),
                        product_unit: item.product_unit.clone(),
                        quantity: item.quantity,
                        tax_rate: item.tax_rate,
                        subtotal: item.subtotal,
                        tax_amount: item.tax_amount,
                        total_amount: item.total_amount,
                    })
            })
            .collect())
    }
}

impl Directory for InMemoryMarket {
    async fn buyer(&self, buyer: BuyerRef) -> Result<Option<BuyerProfile>, RepositoryError> {
        Ok(self.lock().buyers.get(&buyer).cloned())
    }

    async fn farmer(&self, id: FarmerId) -> Result<Option<FarmerProfile>, RepositoryError> {
        Ok(self.lock().farmers.get(&id).cloned())
    }
}

// =============================================================================
// Messaging channel
// =============================================================================

/// One pushed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pushed {
    pub access_token: String,
    pub recipient: String,
    pub text: String,
}

#[derive(Default)]
struct ChannelState {
    pushed: Mutex<Vec<Pushed>>,
    exchanges: AtomicUsize,
    failing_recipients: Mutex<HashSet<String>>,
    failing_channels: Mutex<HashSet<String>>,
}

/// Issues `<channel_id>-token-<n>` and records every push.
///
/// Clones share state; hand one clone to the token cache and keep another to
/// inspect.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    state: Arc<ChannelState>,
}

impl RecordingChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes to `recipient` fail with an API error.
    pub fn fail_recipient(&self, recipient: &str) {
        lock(&self.state.failing_recipients).insert(recipient.to_string());
    }

    /// Token exchanges for `channel_id` fail.
    pub fn fail_channel(&self, channel_id: &str) {
        lock(&self.state.failing_channels).insert(channel_id.to_string());
    }

    #[must_use]
    pub fn pushed(&self) -> Vec<Pushed> {
        lock(&self.state.pushed).clone()
    }

    #[must_use]
    pub fn pushed_to(&self, recipient: &str) -> Vec<Pushed> {
        self.pushed()
            .into_iter()
            .filter(|p| p.recipient == recipient)
            .collect()
    }

    #[must_use]
    pub fn exchanges(&self) -> usize {
        self.state.exchanges.load(Ordering::SeqCst)
    }
}

impl MessagingChannel for RecordingChannel {
    async fn exchange_token(
        &self,
        credentials: &ChannelCredentials,
    ) -> Result<IssuedToken, LineError> {
        if lock(&self.state.failing_channels).contains(&credentials.channel_id) {
            return Err(LineError::Api {
                status: 400,
                message: "invalid_client".to_string(),
            });
        }

        let n = self.state.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IssuedToken {
            access_token: SecretString::from(format!("{}-token-{n}", credentials.channel_id)),
            expires_in: 2_592_000,
        })
    }

    async fn push_text(
        &self,
        access_token: &SecretString,
        recipient: &str,
        text: &str,
    ) -> Result<(), LineError> {
        if lock(&self.state.failing_recipients).contains(recipient) {
            return Err(LineError::Api {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        lock(&self.state.pushed).push(Pushed {
            access_token: access_token.expose_secret().to_string(),
            recipient: recipient.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Notifier
// =============================================================================

#[derive(Default)]
struct NotifierState {
    committed: Mutex<Vec<OrderId>>,
    invoices: Mutex<Vec<(BuyerRef, String)>>,
    statements: Mutex<Vec<(FarmerId, String)>>,
}

/// Records committed orders and billing notices without sending anything.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<NotifierState>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn committed(&self) -> Vec<OrderId> {
        lock(&self.state.committed).clone()
    }

    #[must_use]
    pub fn invoices(&self) -> Vec<(BuyerRef, String)> {
        lock(&self.state.invoices).clone()
    }

    #[must_use]
    pub fn statements(&self) -> Vec<(FarmerId, String)> {
        lock(&self.state.statements).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn order_committed(&self, order: &Order) {
        lock(&self.state.committed).push(order.id);
    }

    async fn invoice_ready(&self, invoice: &MonthlyInvoice, document_url: &str) -> DeliveryOutcome {
        lock(&self.state.invoices).push((invoice.buyer, document_url.to_string()));
        DeliveryOutcome::Sent
    }

    async fn statement_ready(
        &self,
        statement: &FarmerStatement,
        document_url: &str,
    ) -> DeliveryOutcome {
        lock(&self.state.statements).push((statement.farmer_id, document_url.to_string()));
        DeliveryOutcome::Sent
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Tomato, 100 yen at 8 %, Aoki Farm.
pub const TOMATO: ProductId = ProductId::new(1);
/// Knife, 200 yen at 10 %, Aoki Farm.
pub const KNIFE: ProductId = ProductId::new(2);
/// Inactive, Aoki Farm.
pub const WINTER_MELON: ProductId = ProductId::new(3);
/// Spinach, 150 yen at 8 %, Baba Farm.
pub const SPINACH: ProductId = ProductId::new(4);
/// Leek, 120 yen at 8 %, Chiba Farm (no LINE account).
pub const LEEK: ProductId = ProductId::new(5);
/// Rice, 500 yen at 8 %, sold by the platform itself.
pub const HOUSE_RICE: ProductId = ProductId::new(6);

pub const AOKI: FarmerId = FarmerId::new(1);
pub const BABA: FarmerId = FarmerId::new(2);
pub const CHIBA: FarmerId = FarmerId::new(3);

/// Closing day 20, linked LINE account.
pub const BISTRO: BuyerRef = BuyerRef::restaurant(1);
/// End-of-month closing, no LINE account.
pub const CANTEEN: BuyerRef = BuyerRef::restaurant(2);
/// Linked LINE account.
pub const SATO: BuyerRef = BuyerRef::consumer(1);

pub const HOME_SLOT: DeliverySlotId = DeliverySlotId::new(10);
pub const PICKUP_SLOT: DeliverySlotId = DeliverySlotId::new(11);
pub const CLOSED_SLOT: DeliverySlotId = DeliverySlotId::new(12);

/// Build a date, panicking on an invalid one.
#[must_use]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid date {y}-{m}-{d}"))
}

#[must_use]
pub fn yen(amount: i64) -> Decimal {
    Decimal::from(amount)
}

fn product(
    id: ProductId,
    name: &str,
    price: i64,
    tax_rate: TaxRate,
    farmer_id: Option<FarmerId>,
) -> ProductSnapshot {
    ProductSnapshot {
        product_id: id,
        name: name.to_string(),
        unit: "pc".to_string(),
        price: yen(price),
        tax_rate,
        is_active: true,
        farmer_id,
    }
}

fn farmer(id: FarmerId, name: &str, line_user_id: Option<&str>) -> FarmerProfile {
    FarmerProfile {
        id,
        name: name.to_string(),
        line_user_id: line_user_id.map(str::to_string),
    }
}

fn buyer(
    buyer: BuyerRef,
    name: &str,
    line_user_id: Option<&str>,
    closing_day: ClosingDay,
) -> BuyerProfile {
    BuyerProfile {
        buyer,
        name: name.to_string(),
        line_user_id: line_user_id.map(str::to_string),
        address: Some("1-2-3 Sannomiya, Kobe".to_string()),
        closing_day,
    }
}

/// A market seeded with the fixture catalog, accounts and slots.
///
/// # Panics
///
/// If the fixture closing day is out of range.
#[must_use]
pub fn market() -> InMemoryMarket {
    let market = InMemoryMarket::new();

    market.add_product(product(TOMATO, "Tomato", 100, TaxRate::Reduced, Some(AOKI)));
    market.add_product(product(KNIFE, "Knife", 200, TaxRate::Standard, Some(AOKI)));
    market.add_product(ProductSnapshot {
        is_active: false,
        ..product(WINTER_MELON, "Winter melon", 300, TaxRate::Reduced, Some(AOKI))
    });
    market.add_product(product(SPINACH, "Spinach", 150, TaxRate::Reduced, Some(BABA)));
    market.add_product(product(LEEK, "Leek", 120, TaxRate::Reduced, Some(CHIBA)));
    market.add_product(product(HOUSE_RICE, "Rice", 500, TaxRate::Reduced, None));

    market.add_farmer(farmer(AOKI, "Aoki Farm", Some("U-aoki")));
    market.add_farmer(farmer(BABA, "Baba Farm", Some("U-baba")));
    market.add_farmer(farmer(CHIBA, "Chiba Farm", None));

    let closing_20 = ClosingDay::new(20).unwrap_or_else(|e| panic!("{e}"));
    market.add_buyer(buyer(BISTRO, "Bistro Kobe", Some("U-bistro"), closing_20));
    market.add_buyer(buyer(CANTEEN, "Harbor Canteen", None, ClosingDay::END_OF_MONTH));
    market.add_buyer(buyer(SATO, "Sato", Some("U-sato"), ClosingDay::END_OF_MONTH));

    for (id, slot_type, is_active, time_text) in [
        (HOME_SLOT, DeliverySlotType::Home, true, "Sat 10:00-12:00"),
        (PICKUP_SLOT, DeliverySlotType::Pickup, true, "Sat 14:00-16:00 at Motomachi"),
        (CLOSED_SLOT, DeliverySlotType::Home, false, "Sun 10:00-12:00"),
    ] {
        market.add_slot(DeliverySlot {
            id,
            date: date(2026, 3, 14),
            slot_type,
            is_active,
            time_text: time_text.to_string(),
        });
    }

    market
}

/// Restaurant route order delivered on `date`.
#[must_use]
pub fn route_order(
    buyer: BuyerRef,
    date: NaiveDate,
    items: &[(ProductId, i32)],
) -> CreateOrderRequest {
    CreateOrderRequest {
        buyer,
        delivery: DeliveryRequest::Route {
            date,
            time_slot: DeliveryTimeSlot::Noon,
            address: "1-2-3 Sannomiya, Kobe".to_string(),
            notes: None,
        },
        items: order_items(items),
    }
}

/// Consumer order against a published slot.
#[must_use]
pub fn slot_order(
    buyer: BuyerRef,
    slot_id: DeliverySlotId,
    address: Option<&str>,
    items: &[(ProductId, i32)],
) -> CreateOrderRequest {
    CreateOrderRequest {
        buyer,
        delivery: DeliveryRequest::Slot {
            slot_id,
            address: address.map(str::to_string),
            notes: None,
        },
        items: order_items(items),
    }
}

fn order_items(items: &[(ProductId, i32)]) -> Vec<OrderItemRequest> {
    items
        .iter()
        .map(|&(product_id, quantity)| OrderItemRequest {
            product_id,
            quantity,
        })
        .collect()
}

/// Credentials for the buyer (`buyer-channel`) and producer
/// (`producer-channel`) channels.
#[must_use]
pub fn channels() -> (ChannelCredentials, ChannelCredentials) {
    (
        ChannelCredentials::new(
            "buyer-channel".to_string(),
            SecretString::from("buyer-secret"),
        ),
        ChannelCredentials::new(
            "producer-channel".to_string(),
            SecretString::from("producer-secret"),
        ),
    )
}
