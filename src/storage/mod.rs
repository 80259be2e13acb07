// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state lives in a single embedded redb database under `/data`.
//!
//! ## What is stored
//!
//! - Derivation records: one `(user_id, derivation_index, address)` row per
//!   user, never deleted
//! - The derivation index allocator
//! - The address → user mapping used to attribute deposits
//! - Locally registered users (when no external directory is configured)
//! - Observed deposit transfers, pending ledger credits and scan checkpoints
//!
//! ## Important Notes
//!
//! - No private key material is ever written here
//! - Uniqueness of `user_id`, `derivation_index` and `address` is enforced
//!   inside a single write transaction

pub mod paths;
pub mod records;
pub mod wallet_database;

pub use paths::StoragePaths;
pub use records::{DerivationRecord, InsertOutcome, ObservedTransfer, WalletBalance};
pub use wallet_database::{checkpoint_key, StoreError, StoreResult, WalletDatabase};
