// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit wallet endpoints.
//!
//! Each user has exactly one deposit address, derived from the platform's
//! account xpub. `POST` creates it on first call and returns it unchanged on
//! every later call.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::{ApiError, ErrorBody},
    state::AppState,
    storage::{DerivationRecord, WalletBalance},
};

/// A user's deposit wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletView {
    /// EIP-55 checksummed deposit address
    pub deposit_address: String,
    /// Child index under the account xpub
    pub derivation_index: u32,
    /// Full derivation path of the deposit key
    pub derivation_path: String,
    /// Ledger balances. `null` when the ledger could not be read.
    pub balance: Option<WalletBalance>,
}

/// Response wrapper for wallet endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub wallet: WalletView,
}

/// The wallet is already persisted at this point, so a ledger outage only
/// drops the balance from the response.
async fn render(state: &AppState, record: DerivationRecord) -> WalletResponse {
    let balance = match state.ledger.balance(&record.user_id).await {
        Ok(balance) => Some(balance),
        Err(e) => {
            tracing::warn!(
                user_id = %record.user_id,
                error = %e,
                "Balance lookup failed, returning wallet without balance"
            );
            None
        }
    };
    WalletResponse {
        wallet: WalletView {
            deposit_address: record.address,
            derivation_index: record.derivation_index,
            derivation_path: record.derivation_path,
            balance,
        },
    }
}

/// Get or create the caller's deposit wallet.
///
/// Idempotent: the first call assigns a derivation index and returns 201,
/// every later call returns the same wallet with 200.
#[utoipa::path(
    post,
    path = "/v1/wallet",
    tag = "Wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Wallet created", body = WalletResponse),
        (status = 200, description = "Wallet already existed", body = WalletResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 503, description = "Master key not configured", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn provision_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let outcome = state.provisioner.get_or_create_wallet(&user.user_id).await?;

    let status = if outcome.was_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let response = render(&state, outcome.into_record()).await;
    Ok((status, Json(response)))
}

/// Get the caller's deposit wallet without creating it.
#[utoipa::path(
    get,
    path = "/v1/wallet",
    tag = "Wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet", body = WalletResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "No wallet provisioned yet", body = ErrorBody)
    )
)]
pub async fn get_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<WalletResponse>, ApiError> {
    let record = state
        .provisioner
        .find_wallet(&user.user_id)
        .await?
        .filter(DerivationRecord::has_address)
        .ok_or_else(|| ApiError::not_found("wallet_not_found", "No deposit wallet provisioned"))?;

    Ok(Json(render(&state, record).await))
}
