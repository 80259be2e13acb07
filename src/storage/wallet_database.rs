// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded wallet database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `derivations`: user_id → serialized DerivationRecord (unique per user)
//! - `index_owners`: derivation index → user_id (unique per index)
//! - `address_owners`: lowercase address → user_id (unique per address)
//! - `allocator`: key → next derivation index
//! - `users`: user_id → registration timestamp (local user directory)
//! - `observed_transfers`: transfer_id → serialized ObservedTransfer
//! - `pending_credits`: transfer_id → user_id (not yet accepted by the ledger)
//! - `scan_state`: `network:address` → last scanned block
//! - `chain_tips`: network key → highest confirmed block seen by the reconciler
//!
//! A new deposit address gets a scan checkpoint at every known chain tip in
//! the same transaction that assigns it. Blocks at or below that tip predate
//! the address, so scanning starts right after it. Without a known tip the
//! address is scanned from genesis.
//!
//! redb runs one write transaction at a time, so every operation that opens a
//! write transaction below is serialized against all others. Index reservation
//! and the unique inserts rely on that.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

use super::records::{DerivationRecord, InsertOutcome, ObservedTransfer};
use crate::derivation::MAX_CHILD_INDEX;

// =============================================================================
// Table Definitions
// =============================================================================

const DERIVATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("derivations");

const INDEX_OWNERS: TableDefinition<u32, &str> = TableDefinition::new("index_owners");

const ADDRESS_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("address_owners");

const ALLOCATOR: TableDefinition<&str, u64> = TableDefinition::new("allocator");

const USERS: TableDefinition<&str, i64> = TableDefinition::new("users");

const OBSERVED_TRANSFERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("observed_transfers");

const PENDING_CREDITS: TableDefinition<&str, &str> = TableDefinition::new("pending_credits");

const SCAN_STATE: TableDefinition<&str, u64> = TableDefinition::new("scan_state");

const CHAIN_TIPS: TableDefinition<&str, u64> = TableDefinition::new("chain_tips");

const NEXT_INDEX_KEY: &str = "next_index";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A uniqueness constraint other than `user_id` was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("derivation index space exhausted")]
    IndexSpaceExhausted,

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// WalletDatabase
// =============================================================================

/// Embedded ACID store for derivation records and deposit bookkeeping.
pub struct WalletDatabase {
    db: Database,
    start_index: u32,
}

impl WalletDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DERIVATIONS)?;
            let _ = write_txn.open_table(INDEX_OWNERS)?;
            let _ = write_txn.open_table(ADDRESS_OWNERS)?;
            let _ = write_txn.open_table(ALLOCATOR)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(OBSERVED_TRANSFERS)?;
            let _ = write_txn.open_table(PENDING_CREDITS)?;
            let _ = write_txn.open_table(SCAN_STATE)?;
            let _ = write_txn.open_table(CHAIN_TIPS)?;
        }
        write_txn.commit()?;

        Ok(Self { db, start_index: 0 })
    }

    /// First index the allocator hands out on a fresh database.
    ///
    /// Raising it on an existing database skips ahead; it never moves the
    /// counter backwards.
    pub fn with_start_index(mut self, start_index: u32) -> Self {
        self.start_index = start_index;
        self
    }

    // =========================================================================
    // Derivation records
    // =========================================================================

    /// Look up the record assigned to a user.
    pub fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<DerivationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DERIVATIONS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Atomically take the next derivation index.
    ///
    /// Indices are strictly increasing. An index reserved by a request that
    /// later loses a race is simply never used.
    pub fn reserve_next_index(&self) -> StoreResult<u32> {
        let write_txn = self.db.begin_write()?;
        let index = {
            let mut table = write_txn.open_table(ALLOCATOR)?;
            let stored = table.get(NEXT_INDEX_KEY)?.map(|v| v.value()).unwrap_or(0);
            let next = stored.max(u64::from(self.start_index));
            if next > u64::from(MAX_CHILD_INDEX) {
                return Err(StoreError::IndexSpaceExhausted);
            }
            table.insert(NEXT_INDEX_KEY, next + 1)?;
            next as u32
        };
        write_txn.commit()?;
        Ok(index)
    }

    /// Insert a record unless the user already has one.
    ///
    /// Returns [`InsertOutcome::Existing`] with the stored record when the
    /// user is taken, and [`StoreError::Conflict`] when the index or address
    /// already belongs to someone else.
    pub fn insert_if_absent(&self, record: &DerivationRecord) -> StoreResult<InsertOutcome> {
        let json = serde_json::to_vec(record)?;
        let address_key = record.address.to_lowercase();

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut records = write_txn.open_table(DERIVATIONS)?;
            let existing = records
                .get(record.user_id.as_str())?
                .map(|v| v.value().to_vec());

            if let Some(bytes) = existing {
                InsertOutcome::Existing(serde_json::from_slice(&bytes)?)
            } else {
                let mut index_owners = write_txn.open_table(INDEX_OWNERS)?;
                let index_owner = index_owners
                    .get(record.derivation_index)?
                    .map(|v| v.value().to_string());
                if let Some(owner) = index_owner {
                    return Err(StoreError::Conflict(format!(
                        "derivation index {} already assigned to {owner}",
                        record.derivation_index
                    )));
                }

                if record.has_address() {
                    let mut address_owners = write_txn.open_table(ADDRESS_OWNERS)?;
                    let address_owner = address_owners
                        .get(address_key.as_str())?
                        .map(|v| v.value().to_string());
                    if let Some(owner) = address_owner {
                        return Err(StoreError::Conflict(format!(
                            "address {} already assigned to {owner}",
                            record.address
                        )));
                    }
                    address_owners.insert(address_key.as_str(), record.user_id.as_str())?;
                    seed_scan_checkpoints(&write_txn, &address_key)?;
                }

                index_owners.insert(record.derivation_index, record.user_id.as_str())?;
                records.insert(record.user_id.as_str(), json.as_slice())?;
                InsertOutcome::Inserted(record.clone())
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Fill in the address of a record that was stored without one.
    ///
    /// The index of the stored record must match `index`. A record that
    /// already has an address is returned unchanged.
    pub fn complete_address(
        &self,
        user_id: &str,
        index: u32,
        address: &str,
    ) -> StoreResult<DerivationRecord> {
        let address_key = address.to_lowercase();

        let write_txn = self.db.begin_write()?;
        let record = {
            let mut records = write_txn.open_table(DERIVATIONS)?;
            let bytes = records
                .get(user_id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("Derivation record for {user_id}")))?;
            let mut record: DerivationRecord = serde_json::from_slice(&bytes)?;

            if record.derivation_index != index {
                return Err(StoreError::Conflict(format!(
                    "record for {user_id} is at index {}, not {index}",
                    record.derivation_index
                )));
            }

            if record.has_address() {
                record
            } else {
                let mut address_owners = write_txn.open_table(ADDRESS_OWNERS)?;
                let address_owner = address_owners
                    .get(address_key.as_str())?
                    .map(|v| v.value().to_string());
                if let Some(owner) = address_owner {
                    if owner != user_id {
                        return Err(StoreError::Conflict(format!(
                            "address {address} already assigned to {owner}"
                        )));
                    }
                }

                record.address = address.to_string();
                let json = serde_json::to_vec(&record)?;
                records.insert(user_id, json.as_slice())?;
                address_owners.insert(address_key.as_str(), user_id)?;
                seed_scan_checkpoints(&write_txn, &address_key)?;
                record
            }
        };
        write_txn.commit()?;
        Ok(record)
    }

    // =========================================================================
    // Address ↔ User mapping
    // =========================================================================

    /// Look up which user owns a deposit address (case-insensitive).
    pub fn user_for_address(&self, address: &str) -> StoreResult<Option<String>> {
        let addr = address.to_lowercase();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADDRESS_OWNERS)?;
        match table.get(addr.as_str())? {
            Some(v) => Ok(Some(v.value().to_string())),
            None => Ok(None),
        }
    }

    /// All assigned deposit addresses as `(lowercase_address, user_id)`.
    pub fn list_addresses(&self) -> StoreResult<Vec<(String, String)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADDRESS_OWNERS)?;
        let mut addresses = Vec::new();
        for entry in table.iter()? {
            let (address, user_id) = entry?;
            addresses.push((address.value().to_string(), user_id.value().to_string()));
        }
        Ok(addresses)
    }

    // =========================================================================
    // Local user directory
    // =========================================================================

    /// Register a user id in the local directory. Idempotent.
    pub fn register_user(&self, user_id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            let exists = table.get(user_id)?.is_some();
            if !exists {
                table.insert(user_id, Utc::now().timestamp())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Whether the local directory knows `user_id`.
    pub fn user_exists(&self, user_id: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        Ok(table.get(user_id)?.is_some())
    }

    // =========================================================================
    // Observed deposits
    // =========================================================================

    /// Record a transfer the first time it is seen.
    ///
    /// Returns `false` if it was already recorded. New transfers are also
    /// queued as pending ledger credits.
    pub fn record_transfer_if_new(&self, transfer: &ObservedTransfer) -> StoreResult<bool> {
        let json = serde_json::to_vec(transfer)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut transfers = write_txn.open_table(OBSERVED_TRANSFERS)?;
            let seen = transfers.get(transfer.transfer_id.as_str())?.is_some();
            if seen {
                false
            } else {
                transfers.insert(transfer.transfer_id.as_str(), json.as_slice())?;
                if transfer.credited_at.is_none() {
                    let mut pending = write_txn.open_table(PENDING_CREDITS)?;
                    pending.insert(transfer.transfer_id.as_str(), transfer.user_id.as_str())?;
                }
                true
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Look up a recorded transfer.
    pub fn get_transfer(&self, transfer_id: &str) -> StoreResult<Option<ObservedTransfer>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBSERVED_TRANSFERS)?;
        match table.get(transfer_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Transfers the ledger has not accepted yet.
    pub fn pending_credits(&self) -> StoreResult<Vec<ObservedTransfer>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_CREDITS)?;
        let transfers = read_txn.open_table(OBSERVED_TRANSFERS)?;

        let mut result = Vec::new();
        for entry in pending.iter()? {
            let (transfer_id, _) = entry?;
            if let Some(value) = transfers.get(transfer_id.value())? {
                result.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(result)
    }

    /// Mark a transfer as credited and drop it from the pending queue.
    pub fn mark_credited(&self, transfer_id: &str) -> StoreResult<ObservedTransfer> {
        let write_txn = self.db.begin_write()?;
        let transfer = {
            let mut transfers = write_txn.open_table(OBSERVED_TRANSFERS)?;
            let bytes = transfers
                .get(transfer_id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("Transfer {transfer_id}")))?;
            let mut transfer: ObservedTransfer = serde_json::from_slice(&bytes)?;

            if transfer.credited_at.is_none() {
                transfer.credited_at = Some(Utc::now());
                let json = serde_json::to_vec(&transfer)?;
                transfers.insert(transfer_id, json.as_slice())?;
            }

            let mut pending = write_txn.open_table(PENDING_CREDITS)?;
            pending.remove(transfer_id)?;
            transfer
        };
        write_txn.commit()?;
        Ok(transfer)
    }

    // =========================================================================
    // Scan checkpoints
    // =========================================================================

    /// Last block scanned for `key`, if any.
    pub fn last_scanned_block(&self, key: &str) -> StoreResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCAN_STATE)?;
        Ok(table.get(key)?.map(|v| v.value()))
    }

    /// Persist the last scanned block for `key`. Never moves backwards.
    pub fn set_last_scanned_block(&self, key: &str, block: u64) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SCAN_STATE)?;
            let current = table.get(key)?.map(|v| v.value());
            if current.is_none_or(|c| c < block) {
                table.insert(key, block)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Highest confirmed block recorded for `network`.
    pub fn chain_tip(&self, network: &str) -> StoreResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHAIN_TIPS)?;
        Ok(table.get(network)?.map(|v| v.value()))
    }

    /// Raise the confirmed tip of `network` to `block`. Lower values are ignored.
    pub fn advance_chain_tip(&self, network: &str, block: u64) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHAIN_TIPS)?;
            let current = table.get(network)?.map(|v| v.value());
            if current.is_none_or(|c| c < block) {
                table.insert(network, block)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Scan checkpoint key for `address` on `network`.
pub fn checkpoint_key(network: &str, address: &str) -> String {
    format!("{network}:{}", address.to_lowercase())
}

/// Start scans of a newly assigned address at every known chain tip.
fn seed_scan_checkpoints(txn: &WriteTransaction, address_key: &str) -> StoreResult<()> {
    let tips = {
        let table = txn.open_table(CHAIN_TIPS)?;
        let mut tips = Vec::new();
        for entry in table.iter()? {
            let (network, tip) = entry?;
            tips.push((network.value().to_string(), tip.value()));
        }
        tips
    };

    let mut checkpoints = txn.open_table(SCAN_STATE)?;
    for (network, tip) in tips {
        let key = checkpoint_key(&network, address_key);
        let exists = checkpoints.get(key.as_str())?.is_some();
        if !exists {
            checkpoints.insert(key.as_str(), tip)?;
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
