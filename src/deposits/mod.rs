// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Reconciliation
//!
//! Matches confirmed ERC-20 transfers into deposit addresses against users
//! and hands them to the ledger for crediting.
//!
//! ## Strategy
//!
//! 1. For each assigned address, `eth_getLogs` with the Transfer topic and
//!    `topic2 = address`, filtered to the watched token contracts.
//! 2. Only blocks at least `confirmations` below the head are scanned.
//! 3. Each transfer is recorded once, keyed by `tx_hash:log_index`, and queued
//!    as a pending credit.
//! 4. Pending credits are sent to the ledger with the transfer id as
//!    reference and marked credited once accepted.
//!
//! ## Checkpointing
//!
//! The last scanned block is persisted per `(network, address)`. On restart,
//! scanning resumes from the checkpoint. Addresses assigned after the
//! reconciler has seen the chain start at the confirmed tip of that moment.
//! Anything else is scanned from genesis.

pub mod reconciler;

use std::future::Future;

use alloy::primitives::Address;

use crate::blockchain::{ChainClient, ChainClientError, TransferLog};
use crate::storage::StoreError;

pub use reconciler::DepositReconciler;

/// Source of confirmed-or-not transfer logs. The reconciler applies the
/// confirmation depth itself.
pub trait TransferSource: Send + Sync + 'static {
    fn head_block(&self) -> impl Future<Output = Result<u64, ChainClientError>> + Send;

    fn transfers_to(
        &self,
        to: Address,
        contracts: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<TransferLog>, ChainClientError>> + Send;
}

impl TransferSource for ChainClient {
    async fn head_block(&self) -> Result<u64, ChainClientError> {
        self.get_block_number().await
    }

    async fn transfers_to(
        &self,
        to: Address,
        contracts: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, ChainClientError> {
        ChainClient::transfers_to(self, to, contracts, from_block, to_block).await
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address {0} is not a deposit address")]
    UnknownAddress(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainClientError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}
