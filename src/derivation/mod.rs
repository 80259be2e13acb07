// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Watch-Only Address Derivation
//!
//! Deposit addresses are derived from a single account-level extended public
//! key (BIP-32, secp256k1). Only public derivation is performed:
//!
//! ```text
//! account xpub (m/44'/60'/0'/0)
//!   └── child i (non-hardened) → uncompressed pubkey → keccak256 → last 20 bytes
//! ```
//!
//! No extended private key is ever loaded by this process. Compromise of the
//! server therefore leaks which addresses belong to which user, but never the
//! authority to spend from them.

pub mod deriver;
pub mod master_key;

pub use deriver::{derive, evm_address, MAX_CHILD_INDEX};
pub use master_key::{MasterKeyMaterial, DEFAULT_ACCOUNT_PATH};

/// Errors raised while parsing key material or deriving child addresses.
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Derivation index {0} is outside the non-hardened child range")]
    IndexOutOfRange(u64),

    #[error("Child key derivation failed at index {index}: {reason}")]
    ChildDerivation { index: u32, reason: String },
}
