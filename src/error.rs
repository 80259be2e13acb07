// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::deposits::ReconcileError;
use crate::provisioning::ProvisioningError;
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    /// Stable, machine-readable error code
    pub code: &'static str,
    pub message: String,
}

/// Error response body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Stable snake_case error code
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn service_unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, error = %self.message, "Request failed");
        }
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        let message = err.to_string();
        match err {
            ProvisioningError::UserNotFound(_) => Self::not_found("user_not_found", message),
            ProvisioningError::MasterKeyUnavailable => {
                Self::service_unavailable("master_key_unavailable", message)
            }
            ProvisioningError::PersistenceConflict(_) => {
                Self::new(StatusCode::CONFLICT, "persistence_conflict", message)
            }
            ProvisioningError::InvalidKeyMaterial(_) => {
                Self::internal("invalid_key_material", message)
            }
            ProvisioningError::DerivationError(_) => Self::internal("derivation_error", message),
            ProvisioningError::PersistenceFailure(_) => {
                Self::internal("persistence_failure", message)
            }
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::InvalidAddress(_) => Self::bad_request(message),
            ReconcileError::UnknownAddress(_) => {
                Self::not_found("unknown_deposit_address", message)
            }
            ReconcileError::Chain(_) => Self::service_unavailable("chain_unavailable", message),
            ReconcileError::Store(_) => Self::internal("persistence_failure", message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::internal("persistence_failure", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("wallet_not_found", "missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.code, "wallet_not_found");
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.code, "bad_request");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","code":"bad_request"}"#);
    }

    #[test]
    fn provisioning_errors_map_to_statuses() {
        let cases = [
            (ProvisioningError::UserNotFound("u".into()), StatusCode::NOT_FOUND),
            (ProvisioningError::MasterKeyUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ProvisioningError::PersistenceConflict("c".into()), StatusCode::CONFLICT),
            (ProvisioningError::InvalidKeyMaterial("k".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ProvisioningError::DerivationError("d".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ProvisioningError::PersistenceFailure("p".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn reconcile_errors_map_to_statuses() {
        let unknown = ApiError::from(ReconcileError::UnknownAddress("0x01".into()));
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.code, "unknown_deposit_address");

        let chain = ApiError::from(ReconcileError::Chain(
            crate::blockchain::ChainClientError::RpcError("timeout".into()),
        ));
        assert_eq!(chain.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
