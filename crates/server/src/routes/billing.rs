//! Billing API handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use farmlink_core::billing::{FarmerStatement, MonthlyInvoice, TargetMonth};
use farmlink_core::order::BuyerRef;
use farmlink_core::{BuyerId, BuyerKind, FarmerId};

use crate::error::AppError;
use crate::notifications::DeliveryOutcome;
use crate::services::BillingError;
use crate::state::AppState;

/// Build the billing router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing/{buyer_kind}/{buyer_id}/{month}", get(invoice))
        .route(
            "/billing/{buyer_kind}/{buyer_id}/{month}/notify",
            post(notify_invoice),
        )
        .route("/statements/farmers/{farmer_id}/{month}", get(statement))
        .route(
            "/statements/farmers/{farmer_id}/{month}/notify",
            post(notify_statement),
        )
}

/// Request for pushing a document link to the buyer or farmer.
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub document_url: String,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub invoice: MonthlyInvoice,
    pub notification: DeliveryOutcome,
}

#[derive(Debug, Serialize)]
pub struct NotifyStatementResponse {
    pub statement: FarmerStatement,
    pub notification: DeliveryOutcome,
}

fn parse_month(raw: &str) -> Result<TargetMonth, AppError> {
    raw.parse::<TargetMonth>()
        .map_err(|e| BillingError::Input(e).into())
}

/// Monthly invoice for one buyer.
///
/// # Errors
///
/// Returns 400 for a malformed month and 404 for an unknown buyer.
pub async fn invoice(
    State(state): State<AppState>,
    Path((kind, buyer_id, month)): Path<(BuyerKind, i32, String)>,
) -> Result<Json<MonthlyInvoice>, AppError> {
    let month = parse_month(&month)?;
    let buyer = BuyerRef::new(kind, BuyerId::new(buyer_id));
    Ok(Json(state.billing().monthly_invoice(buyer, month).await?))
}

/// Push a rendered invoice link to the buyer.
///
/// # Errors
///
/// Returns 400 for a malformed month or document URL.
pub async fn notify_invoice(
    State(state): State<AppState>,
    Path((kind, buyer_id, month)): Path<(BuyerKind, i32, String)>,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, AppError> {
    let month = parse_month(&month)?;
    let buyer = BuyerRef::new(kind, BuyerId::new(buyer_id));
    let (invoice, notification) = state
        .billing()
        .notify_invoice_ready(buyer, month, &body.document_url)
        .await?;
    Ok(Json(NotifyResponse {
        invoice,
        notification,
    }))
}

/// Calendar-month sales statement for one farmer.
///
/// # Errors
///
/// Returns 400 for a malformed month and 404 for an unknown farmer.
pub async fn statement(
    State(state): State<AppState>,
    Path((farmer_id, month)): Path<(i32, String)>,
) -> Result<Json<FarmerStatement>, AppError> {
    let month = parse_month(&month)?;
    Ok(Json(
        state
            .billing()
            .farmer_statement(FarmerId::new(farmer_id), month)
            .await?,
    ))
}

/// Push a rendered payment notice link to the farmer.
///
/// # Errors
///
/// Returns 400 for a malformed month or document URL and 404 for an unknown
/// farmer.
pub async fn notify_statement(
    State(state): State<AppState>,
    Path((farmer_id, month)): Path<(i32, String)>,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<NotifyStatementResponse>, AppError> {
    let month = parse_month(&month)?;
    let (statement, notification) = state
        .billing()
        .notify_statement_ready(FarmerId::new(farmer_id), month, &body.document_url)
        .await?;
    Ok(Json(NotifyStatementResponse {
        statement,
        notification,
    }))
}
