// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// The durable (user, index, address) assignment.
///
/// Written once per user and never deleted: funds may arrive at an address
/// for as long as the platform exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DerivationRecord {
    /// Platform user ID
    pub user_id: String,
    /// Non-hardened child index under the account xpub
    pub derivation_index: u32,
    /// Full path of the child key, e.g. `m/44'/60'/0'/0/17`
    pub derivation_path: String,
    /// EIP-55 deposit address (empty only for rows provisioned partially)
    pub address: String,
    /// When the index was assigned
    pub created_at: DateTime<Utc>,
}

impl DerivationRecord {
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// Result of an insert guarded by the unique constraint on `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written.
    Inserted(DerivationRecord),
    /// Another writer got there first; this is the stored record.
    Existing(DerivationRecord),
}

impl InsertOutcome {
    pub fn into_record(self) -> DerivationRecord {
        match self {
            InsertOutcome::Inserted(record) | InsertOutcome::Existing(record) => record,
        }
    }
}

/// Ledger balances, owned by the external ledger. Read-only here.
///
/// Amounts are decimal strings to avoid float rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletBalance {
    #[serde(default = "zero", deserialize_with = "decimal")]
    pub deposit_balance: String,
    #[serde(default = "zero", deserialize_with = "decimal")]
    pub income_balance: String,
    #[serde(default = "zero", deserialize_with = "decimal")]
    pub total_deposited: String,
    #[serde(default = "zero", deserialize_with = "decimal")]
    pub total_withdrawn: String,
}

impl Default for WalletBalance {
    fn default() -> Self {
        Self {
            deposit_balance: zero(),
            income_balance: zero(),
            total_deposited: zero(),
            total_withdrawn: zero(),
        }
    }
}

fn zero() -> String {
    "0".to_string()
}

/// Accept numeric columns as JSON numbers, strings or null.
fn decimal<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(zero()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        other => Err(serde::de::Error::custom(format!(
            "expected a decimal amount, got {other}"
        ))),
    }
}

/// A confirmed ERC-20 transfer into a deposit address, recorded once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ObservedTransfer {
    /// `{tx_hash}:{log_index}`
    pub transfer_id: String,
    pub user_id: String,
    /// Deposit address (lowercase)
    pub address: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    /// Token contract (lowercase)
    pub token_contract: String,
    /// Amount in the token's smallest unit
    pub amount_raw: String,
    /// Amount formatted with token decimals
    pub amount: String,
    pub observed_at: DateTime<Utc>,
    /// Set once the ledger accepted the credit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credited_at: Option<DateTime<Utc>>,
}

impl ObservedTransfer {
    pub fn transfer_id(tx_hash: &str, log_index: u64) -> String {
        format!("{}:{log_index}", tx_hash.to_lowercase())
    }
}
