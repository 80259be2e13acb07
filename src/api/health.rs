// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness and readiness probes.
//!
//! Readiness fails while no master key is loaded: the process is up, but it
//! cannot hand out deposit addresses.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Ok,
    Missing,
    /// Optional component in use
    Configured,
    /// Optional component not set up; the service runs without it
    Disabled,
}

/// Per-component readiness.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: ComponentStatus,
    pub data_dir: ComponentStatus,
    pub master_key: ComponentStatus,
    /// Fingerprint of the loaded account xpub
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_key_fingerprint: Option<String>,
    pub ledger: ComponentStatus,
    pub reconciler: ComponentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn present(ok: bool) -> ComponentStatus {
    if ok {
        ComponentStatus::Ok
    } else {
        ComponentStatus::Missing
    }
}

fn optional(configured: bool) -> ComponentStatus {
    if configured {
        ComponentStatus::Configured
    } else {
        ComponentStatus::Disabled
    }
}

fn evaluate(state: &AppState) -> (StatusCode, ReadyResponse) {
    let master_key = state.provisioner.master_key();
    let checks = HealthChecks {
        service: ComponentStatus::Ok,
        data_dir: present(state.paths.root().is_dir()),
        master_key: present(master_key.is_some()),
        master_key_fingerprint: master_key.map(|k| k.fingerprint()),
        ledger: optional(state.ledger.is_configured()),
        reconciler: optional(state.reconciler.is_some()),
    };

    let ready =
        checks.data_dir == ComponentStatus::Ok && checks.master_key == ComponentStatus::Ok;
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        ReadyResponse {
            status: label.to_string(),
            checks,
        },
    )
}

/// Full component report. 503 when not ready.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "All required components available", body = ReadyResponse),
        (status = 503, description = "A required component is missing", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (status, response) = evaluate(&state);
    (status, Json(response))
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is running", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe. Same report as `/health`.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to provision wallets", body = ReadyResponse),
        (status = 503, description = "Not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (status, response) = evaluate(&state);
    if status != StatusCode::OK {
        tracing::warn!(checks = ?response.checks, "Readiness check failed");
    }
    (status, Json(response))
}
