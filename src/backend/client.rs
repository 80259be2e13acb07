// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hosted database REST/RPC client.
//!
//! The platform's user table and wallet ledger live in a hosted relational
//! database exposed over a PostgREST-style API:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | user exists | `GET  /rest/v1/users?id=eq.<id>&select=id` |
//! | read balance | `POST /rest/v1/rpc/get_wallet_balance` |
//! | credit deposit | `POST /rest/v1/rpc/process_wallet_transaction` |
//!
//! Every request carries the service key both as `apikey` and as a bearer
//! token.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use url::Url;

use crate::storage::{ObservedTransfer, WalletBalance};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Ledger transaction type used for on-chain deposits.
const DEPOSIT_TRANSACTION_TYPE: &str = "deposit";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend configuration invalid: {0}")]
    Config(String),

    #[error("Backend request failed: {0}")]
    Request(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Backend response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    service_key: String,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Config(format!("invalid backend URL {base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if service_key.trim().is_empty() {
            return Err(BackendError::Config("service key is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            service_key: service_key.trim().to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the hosted `users` table has a row for `user_id`.
    pub async fn user_exists(&self, user_id: &str) -> Result<bool, BackendError> {
        let mut url = self.endpoint("rest/v1/users")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{user_id}"))
            .append_pair("select", "id");

        let rows: Vec<Value> = self.send(self.http.get(url)).await?;
        Ok(!rows.is_empty())
    }

    /// Current ledger balances for `user_id`.
    pub async fn wallet_balance(&self, user_id: &str) -> Result<WalletBalance, BackendError> {
        let url = self.endpoint("rest/v1/rpc/get_wallet_balance")?;
        let body = json!({ "p_user_id": user_id });

        let value: Value = self.send(self.http.post(url).json(&body)).await?;
        parse_balance(value)
    }

    /// Credit a confirmed deposit. The transfer id is the ledger reference,
    /// so replaying a credit is rejected or ignored by the ledger.
    pub async fn credit_deposit(&self, transfer: &ObservedTransfer) -> Result<(), BackendError> {
        let url = self.endpoint("rest/v1/rpc/process_wallet_transaction")?;
        let body = json!({
            "p_user_id": transfer.user_id,
            "p_type": DEPOSIT_TRANSACTION_TYPE,
            "p_amount": transfer.amount,
            "p_reference": transfer.transfer_id,
            "p_description": format!("On-chain deposit {}", transfer.tx_hash),
        });

        let _: Value = self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        // `void` RPCs answer with an empty body
        let bytes = if bytes.is_empty() {
            b"null".as_slice()
        } else {
            bytes.as_ref()
        };
        serde_json::from_slice(bytes).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// RPC results come back as an object or as a single-row array.
fn parse_balance(value: Value) -> Result<WalletBalance, BackendError> {
    let row = match value {
        Value::Array(mut rows) => {
            if rows.is_empty() {
                return Ok(WalletBalance::default());
            }
            rows.swap_remove(0)
        }
        Value::Null => return Ok(WalletBalance::default()),
        other => other,
    };
    serde_json::from_value(row).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}
