// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Provisioning
//!
//! Idempotent "get or create" of a user's deposit wallet.
//!
//! ## Flow
//!
//! ```text
//! get_or_create_wallet(user_id)
//!   ├── master key configured?           no  → MasterKeyUnavailable
//!   ├── user exists?                     no  → UserNotFound
//!   ├── record with address?             yes → return it
//!   ├── record without address?          yes → derive at its own index, fill in
//!   └── reserve index → derive → insert_if_absent
//!         ├── Inserted                   → created
//!         └── Existing (lost the race)   → return the winner's record
//! ```
//!
//! A conflict on index or address uniqueness is retried once. A second
//! conflict is reported as a persistence failure.

pub mod service;

use std::future::Future;

use crate::backend::DirectoryError;
use crate::derivation::DeriveError;
use crate::storage::{DerivationRecord, InsertOutcome, StoreError, StoreResult, WalletDatabase};

pub use service::{Provisioned, WalletProvisioner};

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Persistence the provisioner needs. Unique on user, index and address.
pub trait WalletStore: Send + Sync + 'static {
    fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> impl Future<Output = StoreResult<Option<DerivationRecord>>> + Send;

    /// Take the next index from a strictly ordered counter.
    fn reserve_next_index(&self) -> impl Future<Output = StoreResult<u32>> + Send;

    fn insert_if_absent(
        &self,
        record: &DerivationRecord,
    ) -> impl Future<Output = StoreResult<InsertOutcome>> + Send;

    /// Fill in a missing address for the record already stored at `index`.
    fn complete_address(
        &self,
        user_id: &str,
        index: u32,
        address: &str,
    ) -> impl Future<Output = StoreResult<DerivationRecord>> + Send;
}

/// User-existence check against whatever owns the user table.
pub trait UserDirectory: Send + Sync + 'static {
    fn user_exists(&self, user_id: &str)
        -> impl Future<Output = Result<bool, DirectoryError>> + Send;
}

impl WalletStore for WalletDatabase {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<DerivationRecord>> {
        WalletDatabase::find_by_user_id(self, user_id)
    }

    async fn reserve_next_index(&self) -> StoreResult<u32> {
        WalletDatabase::reserve_next_index(self)
    }

    async fn insert_if_absent(&self, record: &DerivationRecord) -> StoreResult<InsertOutcome> {
        WalletDatabase::insert_if_absent(self, record)
    }

    async fn complete_address(
        &self,
        user_id: &str,
        index: u32,
        address: &str,
    ) -> StoreResult<DerivationRecord> {
        WalletDatabase::complete_address(self, user_id, index, address)
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Address derivation failed: {0}")]
    DerivationError(String),

    #[error("Master key is not configured")]
    MasterKeyUnavailable,

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl From<DeriveError> for ProvisioningError {
    fn from(err: DeriveError) -> Self {
        match err {
            DeriveError::InvalidKeyMaterial(msg) => ProvisioningError::InvalidKeyMaterial(msg),
            other => ProvisioningError::DerivationError(other.to_string()),
        }
    }
}

impl From<StoreError> for ProvisioningError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ProvisioningError::PersistenceConflict(msg),
            StoreError::IndexSpaceExhausted => {
                ProvisioningError::DerivationError(StoreError::IndexSpaceExhausted.to_string())
            }
            other => ProvisioningError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<DirectoryError> for ProvisioningError {
    fn from(err: DirectoryError) -> Self {
        ProvisioningError::PersistenceFailure(format!("user lookup failed: {err}"))
    }
}
