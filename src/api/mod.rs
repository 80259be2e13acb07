// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    state::AppState,
    storage::{DerivationRecord, ObservedTransfer, WalletBalance},
};

pub mod deposits;
pub mod health;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/wallet",
            get(wallet::get_wallet).post(wallet::provision_wallet),
        )
        .route(
            "/wallet/deposits/reconcile",
            post(deposits::reconcile_deposits),
        )
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .extensions()
                    .get::<RequestId>()
                    .and_then(|id| id.header_value().to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(request_layers)
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        wallet::provision_wallet,
        wallet::get_wallet,
        deposits::reconcile_deposits,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            wallet::WalletView,
            wallet::WalletResponse,
            deposits::ReconcileResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::ComponentStatus,
            health::HealthResponse,
            DerivationRecord,
            WalletBalance,
            ObservedTransfer,
            ErrorBody
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Wallet", description = "Deposit address provisioning"),
        (name = "Deposits", description = "On-chain deposit reconciliation"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
