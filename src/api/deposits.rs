// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::{ApiError, ErrorBody},
    state::AppState,
    storage::ObservedTransfer,
};

/// Result of an on-demand deposit scan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconcileResponse {
    /// The scanned deposit address
    pub deposit_address: String,
    /// Confirmed transfers seen for the first time by this scan
    pub observed: Vec<ObservedTransfer>,
    /// Pending transfers the ledger accepted during this request
    pub credited: usize,
}

/// Scan the caller's deposit address for new confirmed transfers.
#[utoipa::path(
    post,
    path = "/v1/wallet/deposits/reconcile",
    tag = "Deposits",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Scan complete", body = ReconcileResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "No deposit wallet provisioned", body = ErrorBody),
        (status = 503, description = "Chain unavailable or scanning disabled", body = ErrorBody)
    )
)]
pub async fn reconcile_deposits(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let record = state
        .provisioner
        .find_wallet(&user.user_id)
        .await?
        .filter(|r| r.has_address())
        .ok_or_else(|| ApiError::not_found("wallet_not_found", "No deposit wallet provisioned"))?;

    let reconciler = state.reconciler.as_ref().ok_or_else(|| {
        ApiError::service_unavailable("reconciler_disabled", "Deposit scanning is not configured")
    })?;

    let observed = reconciler.reconcile_deposits(&record.address).await?;
    let credited = match reconciler.credit_pending().await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(
                user_id = %user.user_id,
                error = %e,
                "Crediting pending deposits failed"
            );
            0
        }
    };

    Ok(Json(ReconcileResponse {
        deposit_address: record.address,
        observed,
        credited,
    }))
}
