//! Unified error handling for the HTTP layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{BillingError, OrderError};

/// Application-level error type returned by handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Order(err) => match err {
                OrderError::Validation(v) if v.is_not_found() => StatusCode::NOT_FOUND,
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::Transition(_) | OrderError::Stale(_) => StatusCode::CONFLICT,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::Repository(repo) => repository_status(repo),
            },
            Self::Billing(err) => match err {
                BillingError::Input(_) | BillingError::InvalidDocumentUrl(_) => {
                    StatusCode::BAD_REQUEST
                }
                BillingError::BuyerNotFound(_) | BillingError::FarmerNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BillingError::Repository(repo) => repository_status(repo),
            },
        }
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use farmlink_core::billing::BillingInputError;
    use farmlink_core::order::{OrderValidationError, SlotRejection, TransitionError};
    use farmlink_core::order::BuyerRef;
    use farmlink_core::{DeliverySlotId, OrderId, OrderStatus, ProductId};

    use super::*;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        assert_eq!(
            status_of(OrderError::Validation(OrderValidationError::EmptyOrder)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrderError::Validation(
                OrderValidationError::ProductInactive {
                    product_id: ProductId::new(1),
                    name: "Kale".to_string(),
                }
            )),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_missing_references_are_not_found() {
        assert_eq!(
            status_of(OrderError::Validation(
                OrderValidationError::ProductNotFound(ProductId::new(9))
            )),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::Validation(OrderValidationError::InvalidSlot {
                slot_id: DeliverySlotId::new(3),
                reason: SlotRejection::Missing,
            })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::Validation(OrderValidationError::InvalidSlot {
                slot_id: DeliverySlotId::new(3),
                reason: SlotRejection::Inactive,
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrderError::NotFound(OrderId::new(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BillingError::BuyerNotFound(BuyerRef::restaurant(4))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_transition_and_stale_are_conflicts() {
        assert_eq!(
            status_of(OrderError::Transition(TransitionError {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::Stale(OrderId::new(1))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_billing_input_is_bad_request() {
        assert_eq!(
            status_of(BillingError::Input(BillingInputError::InvalidClosingDay(31))),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = AppError::from(OrderError::Repository(RepositoryError::DataCorruption(
            "bad row".to_string(),
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(
            body.get("error").and_then(serde_json::Value::as_str),
            Some("Internal server error")
        );
    }
}
