// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{ReconcileError, TransferSource};
use crate::backend::Ledger;
use crate::blockchain::{format_amount, NetworkConfig, TransferLog};
use crate::storage::{checkpoint_key, ObservedTransfer, WalletDatabase};

/// Default block chunk size per `eth_getLogs` query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Scans deposit addresses and forwards confirmed transfers to the ledger.
pub struct DepositReconciler<C> {
    db: Arc<WalletDatabase>,
    chain: C,
    ledger: Ledger,
    network: NetworkConfig,
    token_contracts: Vec<Address>,
    confirmations: u64,
    chunk_size: u64,
    poll_interval: Duration,
    /// Held for a whole crediting pass so each pending transfer is sent once.
    credit_lock: Mutex<()>,
}

impl<C: TransferSource> DepositReconciler<C> {
    pub fn new(
        db: Arc<WalletDatabase>,
        chain: C,
        ledger: Ledger,
        network: NetworkConfig,
        token_contracts: Vec<Address>,
        confirmations: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            chain,
            ledger,
            network,
            token_contracts,
            confirmations,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval,
            credit_lock: Mutex::new(()),
        }
    }

    /// Record the current confirmed head as the network tip. Addresses
    /// assigned afterwards start scanning from it.
    pub async fn sync_tip(&self) -> Result<Option<u64>, ReconcileError> {
        let head = self.chain.head_block().await?;
        let Some(confirmed) = head.checked_sub(self.confirmations) else {
            return Ok(None);
        };
        self.db.advance_chain_tip(self.network.key, confirmed)?;
        Ok(Some(confirmed))
    }

    /// Record confirmed transfers into `address` not seen before and return
    /// them.
    pub async fn reconcile_deposits(
        &self,
        address: &str,
    ) -> Result<Vec<ObservedTransfer>, ReconcileError> {
        let target: Address = address
            .trim()
            .parse()
            .map_err(|_| ReconcileError::InvalidAddress(address.to_string()))?;
        let address_key = target.to_string().to_lowercase();

        let user_id = self
            .db
            .user_for_address(&address_key)?
            .ok_or_else(|| ReconcileError::UnknownAddress(address.to_string()))?;

        let head = self.chain.head_block().await?;
        if head < self.confirmations {
            return Ok(Vec::new());
        }
        let confirmed = head - self.confirmations;
        self.db.advance_chain_tip(self.network.key, confirmed)?;

        let scan_key = checkpoint_key(self.network.key, &address_key);
        let start = match self.db.last_scanned_block(&scan_key)? {
            Some(last) => last + 1,
            None => {
                tracing::info!(
                    address = %address_key,
                    network = %self.network.key,
                    confirmed,
                    "No scan checkpoint, scanning from genesis"
                );
                0
            }
        };

        let mut observed = Vec::new();
        let mut from = start;
        while from <= confirmed {
            let to = (from + self.chunk_size - 1).min(confirmed);

            let logs = self
                .chain
                .transfers_to(target, &self.token_contracts, from, to)
                .await?;

            for log in logs {
                if !self.is_deposit(&log, target, from, to) {
                    continue;
                }
                let transfer = self.observed(&log, &user_id, &address_key);
                if self.db.record_transfer_if_new(&transfer)? {
                    tracing::info!(
                        user_id = %user_id,
                        transfer_id = %transfer.transfer_id,
                        amount = %transfer.amount,
                        block = transfer.block_number,
                        "Deposit observed"
                    );
                    observed.push(transfer);
                }
            }

            self.db.set_last_scanned_block(&scan_key, to)?;
            from = to + 1;
        }

        Ok(observed)
    }

    /// Send pending credits to the ledger. Returns how many were accepted.
    pub async fn credit_pending(&self) -> Result<usize, ReconcileError> {
        if !self.ledger.is_configured() {
            return Ok(0);
        }

        let _guard = self.credit_lock.lock().await;
        let mut credited = 0;
        for transfer in self.db.pending_credits()? {
            match self.ledger.credit_deposit(&transfer).await {
                Ok(()) => {
                    self.db.mark_credited(&transfer.transfer_id)?;
                    credited += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        transfer_id = %transfer.transfer_id,
                        error = %e,
                        "Ledger credit failed, will retry"
                    );
                }
            }
        }
        Ok(credited)
    }

    /// One pass over every assigned address, then the pending credits.
    pub async fn sweep(&self) -> Result<(), ReconcileError> {
        self.sync_tip().await?;
        let addresses = self.db.list_addresses()?;
        let mut observed = 0;
        for (address, _) in &addresses {
            match self.reconcile_deposits(address).await {
                Ok(found) => observed += found.len(),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Deposit scan failed");
                }
            }
        }

        let credited = self.credit_pending().await?;
        tracing::debug!(
            addresses = addresses.len(),
            observed,
            credited,
            "Deposit sweep complete"
        );
        Ok(())
    }

    /// Run sweeps until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(reconciler.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            network = %self.network.name,
            contracts = self.token_contracts.len(),
            confirmations = self.confirmations,
            interval_secs = self.poll_interval.as_secs(),
            "Deposit reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Deposit reconciler shutting down");
                return;
            }

            if let Err(e) = self.sweep().await {
                tracing::warn!(error = %e, "Deposit sweep failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Deposit reconciler shutting down");
                    return;
                }
            }
        }
    }

    fn is_deposit(&self, log: &TransferLog, target: Address, from: u64, to: u64) -> bool {
        log.to == target
            && self.token_contracts.contains(&log.token_contract)
            && (from..=to).contains(&log.block_number)
            && !log.value.is_zero()
    }

    fn observed(&self, log: &TransferLog, user_id: &str, address: &str) -> ObservedTransfer {
        let contract = log.token_contract.to_string().to_lowercase();
        let decimals = self.network.token_decimals(&contract);
        ObservedTransfer {
            transfer_id: ObservedTransfer::transfer_id(&log.tx_hash, log.log_index),
            user_id: user_id.to_string(),
            address: address.to_string(),
            tx_hash: log.tx_hash.to_lowercase(),
            log_index: log.log_index,
            block_number: log.block_number,
            token_contract: contract,
            amount_raw: log.value.to_string(),
            amount: format_amount(log.value, decimals),
            observed_at: Utc::now(),
            credited_at: None,
        }
    }
}
