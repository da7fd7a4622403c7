//! LINE fan-out for committed orders, plus billing notices.
//!
//! One message goes to the buyer on the buyer channel and one to every
//! distinct farmer on the producer channel, each listing only that farmer's
//! lines. Farmers without a linked LINE account are skipped. Sends run
//! concurrently and fail independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};

use farmlink_core::FarmerId;
use farmlink_core::billing::{FarmerStatement, MonthlyInvoice};
use farmlink_core::order::{BuyerRef, Order, OrderLineItem};

use super::{DeliveryOutcome, DispatchReport, Notifier, messages};
use crate::db::{BuyerProfile, Directory, FarmerProfile};
use crate::line::{ChannelCredentials, ChannelTokenCache, LineError, MessagingChannel};

/// Which channel a message goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Buyer,
    Producer,
}

struct Outgoing {
    audience: Audience,
    recipient: String,
    text: String,
}

/// Sends order and billing messages over two LINE channels.
///
/// Cheap to clone; all clones share one token cache.
pub struct NotificationDispatcher<C, D> {
    inner: Arc<DispatcherInner<C, D>>,
}

struct DispatcherInner<C, D> {
    tokens: ChannelTokenCache<C>,
    directory: D,
    buyer_channel: ChannelCredentials,
    producer_channel: ChannelCredentials,
    /// Buyer recipient used when the buyer has no linked account.
    test_user_id: Option<String>,
}

impl<C, D> Clone for NotificationDispatcher<C, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: MessagingChannel, D: Directory> NotificationDispatcher<C, D> {
    #[must_use]
    pub fn new(
        tokens: ChannelTokenCache<C>,
        directory: D,
        buyer_channel: ChannelCredentials,
        producer_channel: ChannelCredentials,
        test_user_id: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                tokens,
                directory,
                buyer_channel,
                producer_channel,
                test_user_id,
            }),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &ChannelTokenCache<C> {
        &self.inner.tokens
    }

    /// Send every message for `order` and wait for all of them.
    ///
    /// Never fails; the report says what happened.
    #[instrument(skip(self, order), fields(order_id = %order.id, buyer = %order.buyer))]
    pub async fn deliver(&self, order: &Order) -> DispatchReport {
        let mut report = DispatchReport::default();

        let by_farmer = group_by_farmer(&order.items);
        let (buyer, farmers) = tokio::join!(
            self.buyer_profile(order.buyer),
            join_all(by_farmer.keys().map(|id| self.farmer_profile(*id)))
        );

        let farmers: HashMap<FarmerId, FarmerProfile> = farmers
            .into_iter()
            .flatten()
            .map(|profile| (profile.id, profile))
            .collect();
        let farmer_names: HashMap<FarmerId, String> = farmers
            .values()
            .map(|f| (f.id, f.name.clone()))
            .collect();

        let mut outgoing = Vec::with_capacity(by_farmer.len() + 1);

        match self.buyer_recipient(buyer.as_ref()) {
            Some(recipient) => outgoing.push(Outgoing {
                audience: Audience::Buyer,
                recipient,
                text: messages::buyer_confirmation(
                    order,
                    buyer.as_ref().map(|b| b.name.as_str()),
                    &farmer_names,
                ),
            }),
            None => {
                debug!("Buyer has no LINE recipient, skipping confirmation");
                report.record(DeliveryOutcome::Skipped);
            }
        }

        for (farmer_id, lines) in &by_farmer {
            let Some((farmer, recipient)) = farmers
                .get(farmer_id)
                .and_then(|f| f.line_user_id.clone().map(|id| (f, id)))
            else {
                debug!(farmer_id = %farmer_id, "Farmer has no LINE account, skipping");
                report.record(DeliveryOutcome::Skipped);
                continue;
            };

            outgoing.push(Outgoing {
                audience: Audience::Producer,
                recipient,
                text: messages::farmer_harvest_list(order, &farmer.name, lines),
            });
        }

        let outcomes = self.send_all(outgoing).await;
        for outcome in outcomes {
            report.record(outcome);
        }

        info!(
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Order notifications dispatched"
        );
        report
    }

    /// Push the invoice link to the buyer and wait for the result.
    #[instrument(skip(self, invoice, document_url), fields(buyer = %invoice.buyer))]
    pub async fn send_invoice_ready(
        &self,
        invoice: &MonthlyInvoice,
        document_url: &str,
    ) -> DeliveryOutcome {
        let buyer = self.buyer_profile(invoice.buyer).await;
        let Some(recipient) = self.buyer_recipient(buyer.as_ref()) else {
            debug!("Buyer has no LINE recipient, skipping invoice notice");
            return DeliveryOutcome::Skipped;
        };

        let outcomes = self
            .send_all(vec![Outgoing {
                audience: Audience::Buyer,
                recipient,
                text: messages::invoice_ready(invoice, document_url),
            }])
            .await;
        outcomes.into_iter().next().unwrap_or(DeliveryOutcome::Failed)
    }

    /// Push the payment notice link to the farmer and wait for the result.
    ///
    /// Farmers without a linked account are skipped; the test user only
    /// stands in for buyers.
    #[instrument(skip(self, statement, document_url), fields(farmer_id = %statement.farmer_id))]
    pub async fn send_payment_notice(
        &self,
        statement: &FarmerStatement,
        document_url: &str,
    ) -> DeliveryOutcome {
        let Some((farmer, recipient)) = self
            .farmer_profile(statement.farmer_id)
            .await
            .and_then(|f| f.line_user_id.clone().map(|id| (f, id)))
        else {
            debug!("Farmer has no LINE account, skipping payment notice");
            return DeliveryOutcome::Skipped;
        };

        let outcomes = self
            .send_all(vec![Outgoing {
                audience: Audience::Producer,
                recipient,
                text: messages::payment_notice(statement, &farmer.name, document_url),
            }])
            .await;
        outcomes.into_iter().next().unwrap_or(DeliveryOutcome::Failed)
    }

    async fn buyer_profile(&self, buyer: BuyerRef) -> Option<BuyerProfile> {
        match self.inner.directory.buyer(buyer).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, buyer = %buyer, "Buyer lookup failed");
                None
            }
        }
    }

    async fn farmer_profile(&self, id: FarmerId) -> Option<FarmerProfile> {
        match self.inner.directory.farmer(id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, farmer_id = %id, "Farmer lookup failed");
                None
            }
        }
    }

    /// The buyer's own LINE id, else the configured test user.
    fn buyer_recipient(&self, buyer: Option<&BuyerProfile>) -> Option<String> {
        buyer
            .and_then(|b| b.line_user_id.clone())
            .or_else(|| self.inner.test_user_id.clone())
    }

    fn credentials(&self, audience: Audience) -> &ChannelCredentials {
        match audience {
            Audience::Buyer => &self.inner.buyer_channel,
            Audience::Producer => &self.inner.producer_channel,
        }
    }

    /// Send concurrently; outcomes come back in input order.
    async fn send_all(&self, outgoing: Vec<Outgoing>) -> Vec<DeliveryOutcome> {
        if outgoing.is_empty() {
            return Vec::new();
        }

        let needs_buyer = outgoing.iter().any(|m| m.audience == Audience::Buyer);
        let needs_producer = outgoing.iter().any(|m| m.audience == Audience::Producer);

        let (buyer_token, producer_token) = tokio::join!(
            self.token_if(needs_buyer, Audience::Buyer),
            self.token_if(needs_producer, Audience::Producer)
        );

        join_all(outgoing.iter().map(|message| {
            let token = match message.audience {
                Audience::Buyer => buyer_token.as_ref(),
                Audience::Producer => producer_token.as_ref(),
            };
            self.send_one(message, token)
        }))
        .await
    }

    async fn token_if(&self, needed: bool, audience: Audience) -> Option<SecretString> {
        if !needed {
            return None;
        }
        self.inner.tokens.get_token(self.credentials(audience)).await
    }

    async fn send_one(&self, message: &Outgoing, token: Option<&SecretString>) -> DeliveryOutcome {
        // Token exchange failures were already logged by the cache.
        let Some(token) = token else {
            return DeliveryOutcome::Failed;
        };

        match self
            .inner
            .tokens
            .channel()
            .push_text(token, &message.recipient, &message.text)
            .await
        {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => {
                if matches!(e, LineError::Api { status: 401, .. }) {
                    self.inner
                        .tokens
                        .invalidate(&self.credentials(message.audience).channel_id)
                        .await;
                }
                warn!(
                    error = %e,
                    recipient = %message.recipient,
                    timeout = e.is_timeout(),
                    "LINE push failed"
                );
                DeliveryOutcome::Failed
            }
        }
    }
}

impl<C: MessagingChannel, D: Directory> Notifier for NotificationDispatcher<C, D> {
    fn order_committed(&self, order: &Order) {
        let dispatcher = self.clone();
        let order = order.clone();
        tokio::spawn(async move {
            dispatcher.deliver(&order).await;
        });
    }

    async fn invoice_ready(&self, invoice: &MonthlyInvoice, document_url: &str) -> DeliveryOutcome {
        self.send_invoice_ready(invoice, document_url).await
    }

    async fn statement_ready(
        &self,
        statement: &FarmerStatement,
        document_url: &str,
    ) -> DeliveryOutcome {
        self.send_payment_notice(statement, document_url).await
    }
}

/// Line items keyed by supplying farmer; platform-owned lines are left out.
fn group_by_farmer(items: &[OrderLineItem]) -> BTreeMap<FarmerId, Vec<&OrderLineItem>> {
    let mut grouped: BTreeMap<FarmerId, Vec<&OrderLineItem>> = BTreeMap::new();
    for item in items {
        if let Some(farmer_id) = item.farmer_id {
            grouped.entry(farmer_id).or_default().push(item);
        }
    }
    grouped
}
