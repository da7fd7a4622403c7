//! Order API handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::Deserialize;

use farmlink_core::order::{CreateOrderRequest, Order};
use farmlink_core::{OrderId, OrderStatus};

use crate::error::AppError;
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/cancel", post(cancel))
}

/// Request for changing an order's status.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    /// Reject the change unless the order is still at this version.
    #[serde(default)]
    pub expected_version: Option<i32>,
}

/// Optional guard for cancellation.
#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub expected_version: Option<i32>,
}

/// Create an order.
///
/// # Errors
///
/// Returns 400/404 for invalid input and 500 if storage fails.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.orders().create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Fetch an order with its line items.
///
/// # Errors
///
/// Returns 404 for an unknown order.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders().get(OrderId::new(id)).await?))
}

/// Change an order's status.
///
/// # Errors
///
/// Returns 409 for an illegal move or a stale version.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders()
        .transition(OrderId::new(id), body.status, body.expected_version)
        .await?;
    Ok(Json(order))
}

/// Cancel an order that has not shipped.
///
/// # Errors
///
/// Returns 409 once the order has shipped.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<CancelParams>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders()
        .cancel(OrderId::new(id), params.expected_version)
        .await?;
    Ok(Json(order))
}
