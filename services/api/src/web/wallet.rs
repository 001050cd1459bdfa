//! services/api/src/web/wallet.rs
//!
//! Wallet endpoints: the current balance with its ledger history, and
//! top-ups. The balance shown here is the cached derived value; the ledger
//! entries are the source it derives from.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use consult_core::domain::LedgerEntry;

use crate::error::ApiError;
use crate::web::identity::CurrentUser;
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    pub kind: String,
    pub amount: Decimal,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            booking_id: entry.booking_id,
            kind: entry.kind.as_str().to_string(),
            amount: entry.amount,
            status: entry.status.as_str().to_string(),
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WalletResponse {
    pub balance: Decimal,
    pub entries: Vec<LedgerEntryResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct AddFundsRequest {
    pub amount: Decimal,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The caller's balance and transaction history.
#[utoipa::path(
    get,
    path = "/wallet",
    responses(
        (status = 200, description = "Balance and ledger entries", body = WalletResponse),
        (status = 401, description = "Missing identity headers")
    )
)]
pub async fn get_wallet_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .store
        .ledger_for_user(user.id)
        .await
        .map_err(consult_core::EngineError::from)?;
    Ok(Json(WalletResponse {
        balance: user.balance,
        entries: entries.into_iter().map(LedgerEntryResponse::from).collect(),
    }))
}

/// Add funds to the caller's wallet.
#[utoipa::path(
    post,
    path = "/wallet/funds",
    request_body = AddFundsRequest,
    responses(
        (status = 200, description = "New balance", body = WalletResponse),
        (status = 400, description = "Amount must be positive")
    )
)]
pub async fn add_funds_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<AddFundsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.ledger.add_funds(user.id, req.amount).await?;
    let entries = state
        .store
        .ledger_for_user(user.id)
        .await
        .map_err(consult_core::EngineError::from)?;
    Ok((
        StatusCode::OK,
        Json(WalletResponse {
            balance,
            entries: entries.into_iter().map(LedgerEntryResponse::from).collect(),
        }),
    ))
}
