// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module for EVM chains.
//!
//! This module provides functionality for:
//! - Network and deposit-token configuration
//! - Reading confirmed ERC-20 `Transfer` logs into deposit addresses

pub mod client;
pub mod types;

pub use client::{ChainClient, ChainClientError, TransferLog};
pub use types::*;
