//! Order status state machine.
//!
//! ```text
//! Pending → Confirmed → Preparing → Shipped → Delivered
//!    └──────────┴───────────┴──→ Cancelled
//! ```
//!
//! Forward moves may skip intermediate states. Moving backwards, leaving a
//! terminal state and cancelling once shipped are all refused.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::Order;
use crate::types::OrderStatus;

/// An illegal status change. The order is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move order from {from} to {to}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Result of a successful [`Order::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Changed,
    /// The order was already in the requested status.
    Unchanged,
}

impl OrderStatus {
    /// Position on the fulfilment path; `None` for `Cancelled`.
    const fn stage(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Preparing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Whether an order in this status may be cancelled.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Preparing)
    }

    /// Whether `self → to` is a legal move. Staying put is always legal.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match (self.stage(), to.stage()) {
            // cancelled → cancelled
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(_), None) => self.is_cancellable(),
            (Some(from), Some(to)) => from == to || (from < to && !self.is_terminal()),
        }
    }
}

impl Order {
    /// Move the order to `to`, stamping the matching timestamp the first time
    /// that status is entered.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for an illegal move.
    pub fn transition(
        &mut self,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let from = self.status;
        if from == to {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }

        self.status = to;
        self.updated_at = now;

        let stamp = match to {
            OrderStatus::Confirmed => Some(&mut self.confirmed_at),
            OrderStatus::Shipped => Some(&mut self.shipped_at),
            OrderStatus::Delivered => Some(&mut self.delivered_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::Pending | OrderStatus::Preparing => None,
        };
        if let Some(stamp) = stamp {
            stamp.get_or_insert(now);
        }

        Ok(TransitionOutcome::Changed)
    }

    /// Shorthand for a transition to `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] once the order has shipped.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<TransitionOutcome, TransitionError> {
        self.transition(OrderStatus::Cancelled, now)
    }
}
