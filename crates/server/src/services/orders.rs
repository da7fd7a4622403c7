//! Order creation and status changes.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use farmlink_core::order::{
    CreateOrderRequest, DeliveryDetails, DeliveryRequest, Order, OrderDraft, OrderValidationError,
    TransitionError, TransitionOutcome,
};
use farmlink_core::pricing::ShippingFeeTable;
use farmlink_core::{BuyerKind, OrderId, OrderStatus};

use crate::db::{Catalog, OrderStore, RepositoryError};
use crate::notifications::Notifier;

/// Errors returned by [`OrderService`].
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] OrderValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The caller's view of the order is out of date.
    #[error("order {0} was modified concurrently")]
    Stale(OrderId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Creates orders and drives their lifecycle.
pub struct OrderService<C, S, N> {
    catalog: C,
    store: S,
    notifier: N,
    shipping_fees: ShippingFeeTable,
}

impl<C: Catalog, S: OrderStore, N: Notifier> OrderService<C, S, N> {
    #[must_use]
    pub const fn new(catalog: C, store: S, notifier: N, shipping_fees: ShippingFeeTable) -> Self {
        Self {
            catalog,
            store,
            notifier,
            shipping_fees,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Price and store a new order, then schedule its notifications.
    ///
    /// Each product is read once. Nothing is written unless every line
    /// validates; the insert itself is a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for bad input and
    /// `OrderError::Repository` when storage fails.
    #[instrument(skip(self, request), fields(buyer = %request.buyer, lines = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        if request.items.is_empty() {
            return Err(OrderValidationError::EmptyOrder.into());
        }

        let delivery = self
            .resolve_delivery(request.buyer.kind, request.delivery)
            .await?;
        let shipping_fee = self.shipping_fees.fee_for(delivery.kind);

        let mut draft = OrderDraft::new(request.buyer, delivery, shipping_fee);
        for line in &request.items {
            let product = self
                .catalog
                .product(line.product_id)
                .await?
                .ok_or(OrderValidationError::ProductNotFound(line.product_id))?;
            draft.add_line(line.quantity, &product)?;
        }

        let order = self.store.insert(draft.finish()?).await?;
        info!(
            order_id = %order.id,
            total = %order.total_amount,
            "Order created"
        );

        self.notifier.order_committed(&order);
        Ok(order)
    }

    async fn resolve_delivery(
        &self,
        buyer_kind: BuyerKind,
        request: DeliveryRequest,
    ) -> Result<DeliveryDetails, OrderError> {
        match request {
            DeliveryRequest::Route {
                date,
                time_slot,
                address,
                notes,
            } => Ok(DeliveryDetails::route(
                buyer_kind, date, time_slot, address, notes,
            )?),
            DeliveryRequest::Slot {
                slot_id,
                address,
                notes,
            } => {
                let slot = self.catalog.delivery_slot(slot_id).await?;
                Ok(DeliveryDetails::from_slot(
                    buyer_kind, slot_id, slot, address, notes,
                )?)
            }
        }
    }

    /// Load an order with its line items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.store.get(id).await?.ok_or(OrderError::NotFound(id))
    }

    /// Move an order to `to`.
    ///
    /// Moving to the current status succeeds without touching the order.
    /// With `expected_version`, the change is refused if the order moved on
    /// since the caller read it; without it, only a write racing this one is
    /// refused.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Transition` for a disallowed move,
    /// `OrderError::Stale` on a version mismatch and `OrderError::NotFound`
    /// for an unknown order.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        id: OrderId,
        to: OrderStatus,
        expected_version: Option<i32>,
    ) -> Result<Order, OrderError> {
        let mut order = self.get(id).await?;

        if let Some(expected) = expected_version
            && expected != order.version
        {
            return Err(OrderError::Stale(id));
        }

        let from = order.status;
        if order.transition(to, Utc::now())? == TransitionOutcome::Unchanged {
            return Ok(order);
        }

        order.version = self
            .store
            .save_status(&order)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => OrderError::Stale(id),
                other => OrderError::Repository(other),
            })?;

        info!(%from, %to, version = order.version, "Order status changed");
        Ok(order)
    }

    /// Cancel an order that has not shipped yet.
    ///
    /// # Errors
    ///
    /// Same as [`Self::transition`].
    pub async fn cancel(&self, id: OrderId, expected_version: Option<i32>) -> Result<Order, OrderError> {
        self.transition(id, OrderStatus::Cancelled, expected_version)
            .await
    }
}
