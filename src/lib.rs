// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit Wallet Server - Watch-only HD deposit address provisioning
//!
//! Derives one EVM deposit address per user from a single account-level
//! extended public key. Private keys never reach this service.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer token verification (HS256 JWT)
//! - `backend` - User directory and ledger (PostgREST-style backend)
//! - `blockchain` - Network registry and ERC-20 transfer log scanning
//! - `deposits` - Deposit reconciliation against the ledger
//! - `derivation` - BIP-32 public derivation and EIP-55 addresses
//! - `provisioning` - Idempotent get-or-create of deposit wallets
//! - `storage` - Embedded ACID database (redb)

pub mod api;
pub mod auth;
pub mod backend;
pub mod blockchain;
pub mod config;
pub mod deposits;
pub mod derivation;
pub mod error;
pub mod provisioning;
pub mod state;
pub mod storage;
pub mod telemetry;
