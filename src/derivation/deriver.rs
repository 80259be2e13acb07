// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic child address derivation.
//!
//! Ethereum-style addresses are derived by:
//! 1. Non-hardened public child derivation (CKDpub) at `index`
//! 2. Uncompressed child public key (65 bytes: 0x04 || x || y)
//! 3. keccak256 of the 64 coordinate bytes
//! 4. Last 20 bytes of the hash, EIP-55 checksummed, `0x` prefixed

use alloy::primitives::{keccak256, Address};
use bip32::ChildNumber;
use k256::ecdsa::VerifyingKey;

use super::{DeriveError, MasterKeyMaterial};

/// Largest non-hardened child index (2^31 - 1).
pub const MAX_CHILD_INDEX: u32 = (1 << 31) - 1;

/// Derive the deposit address for `index` under `master`.
///
/// Pure: the same `(master, index)` always produces the same address.
pub fn derive(master: &MasterKeyMaterial, index: u32) -> Result<String, DeriveError> {
    if index > MAX_CHILD_INDEX {
        return Err(DeriveError::IndexOutOfRange(u64::from(index)));
    }

    let child_number = ChildNumber::new(index, false)
        .map_err(|_| DeriveError::IndexOutOfRange(u64::from(index)))?;

    let child = master
        .xpub()
        .derive_child(child_number)
        .map_err(|e| DeriveError::ChildDerivation {
            index,
            reason: e.to_string(),
        })?;

    Ok(evm_address(child.public_key()))
}

/// EIP-55 address of a secp256k1 public key.
pub fn evm_address(key: &VerifyingKey) -> String {
    let uncompressed = key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&hash[12..]).to_checksum(None)
}
