// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # External Collaborators
//!
//! The user table and the wallet ledger are owned by the hosted database.
//! When no backend is configured the service runs in local mode:
//!
//! - users come from the embedded database (seeded via `SEED_USER_IDS`)
//! - balances read as zero and deposit credits stay pending

pub mod client;

use std::sync::Arc;

pub use client::{BackendClient, BackendError};

use crate::provisioning::UserDirectory;
use crate::storage::{ObservedTransfer, StoreError, WalletBalance, WalletDatabase};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// User Directory
// =============================================================================

/// Where user existence is checked.
#[derive(Clone)]
pub enum Directory {
    Local(Arc<WalletDatabase>),
    Remote(BackendClient),
}

impl UserDirectory for Directory {
    async fn user_exists(&self, user_id: &str) -> Result<bool, DirectoryError> {
        match self {
            Directory::Local(db) => Ok(db.user_exists(user_id)?),
            Directory::Remote(client) => Ok(client.user_exists(user_id).await?),
        }
    }
}

// =============================================================================
// Ledger Gateway
// =============================================================================

/// Read balances and credit deposits on the external ledger.
#[derive(Clone)]
pub enum Ledger {
    Remote(BackendClient),
    Unconfigured,
}

impl Ledger {
    pub fn is_configured(&self) -> bool {
        matches!(self, Ledger::Remote(_))
    }

    /// Balances for display. Zero when no ledger is configured.
    pub async fn balance(&self, user_id: &str) -> Result<WalletBalance, BackendError> {
        match self {
            Ledger::Remote(client) => client.wallet_balance(user_id).await,
            Ledger::Unconfigured => Ok(WalletBalance::default()),
        }
    }

    /// Credit a confirmed deposit.
    pub async fn credit_deposit(&self, transfer: &ObservedTransfer) -> Result<(), BackendError> {
        match self {
            Ledger::Remote(client) => client.credit_deposit(transfer).await,
            Ledger::Unconfigured => Err(BackendError::Config(
                "no ledger backend configured".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::storage::wallet_database::tests::temp_db;

    #[tokio::test]
    async fn local_directory_uses_registered_users() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        db.register_user("alice").unwrap();

        let directory = Directory::Local(db);
        assert!(directory.user_exists("alice").await.unwrap());
        assert!(!directory.user_exists("bob").await.unwrap());
    }

    #[tokio::test]
    async fn unconfigured_ledger_reads_zero_and_refuses_credits() {
        let ledger = Ledger::Unconfigured;
        assert!(!ledger.is_configured());
        assert_eq!(
            ledger.balance("alice").await.unwrap(),
            WalletBalance::default()
        );

        let transfer = ObservedTransfer {
            transfer_id: "0x01:0".into(),
            user_id: "alice".into(),
            address: "0x01".into(),
            tx_hash: "0x01".into(),
            log_index: 0,
            block_number: 1,
            token_contract: "0x02".into(),
            amount_raw: "1".into(),
            amount: "0.000000000000000001".into(),
            observed_at: Utc::now(),
            credited_at: None,
        };
        assert!(matches!(
            ledger.credit_deposit(&transfer).await,
            Err(BackendError::Config(_))
        ));
    }
}
