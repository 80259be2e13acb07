// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup. Blank values
//! are treated as unset.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the embedded database | `/data` |
//! | `MASTER_XPUB` | Account extended public key | none |
//! | `MASTER_XPUB_FILE` | File containing the account xpub | none |
//! | `MASTER_XPUB_PATH` | Derivation path of the xpub itself | `m/44'/60'/0'/0` |
//! | `DERIVATION_START_INDEX` | First index handed out | `0` |
//! | `AUTH_JWT_SECRET` | HS256 secret for session tokens | none (all tokens rejected) |
//! | `AUTH_JWT_AUDIENCE` | Expected `aud` claim | `authenticated` |
//! | `BACKEND_URL` | Hosted database base URL | none (local mode) |
//! | `BACKEND_SERVICE_KEY` | Hosted database service key | required with `BACKEND_URL` |
//! | `SEED_USER_IDS` | Comma-separated users for the local directory | none |
//! | `CHAIN_NETWORK` | `bsc`, `bsc-testnet`, `ethereum`, `sepolia` | `bsc` |
//! | `CHAIN_RPC_URL` | RPC endpoint override | network default |
//! | `DEPOSIT_TOKEN_CONTRACTS` | Comma-separated ERC-20 contracts to watch | network default |
//! | `DEPOSIT_CONFIRMATIONS` | Blocks below head before a transfer counts | `12` |
//! | `RECONCILE_INTERVAL_SECS` | Reconciler sweep interval, `0` disables | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;

use crate::auth::AuthConfig;
use crate::blockchain::{network_by_key, NetworkConfig, BSC_MAINNET};
use crate::derivation::{DeriveError, MasterKeyMaterial, DEFAULT_ACCOUNT_PATH, MAX_CHILD_INDEX};
use crate::storage::paths::DATA_ROOT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Inline account xpub. Mutually exclusive with [`MASTER_XPUB_FILE_ENV`].
pub const MASTER_XPUB_ENV: &str = "MASTER_XPUB";
/// Path to a mounted secret holding the account xpub.
pub const MASTER_XPUB_FILE_ENV: &str = "MASTER_XPUB_FILE";
pub const MASTER_XPUB_PATH_ENV: &str = "MASTER_XPUB_PATH";
pub const DERIVATION_START_INDEX_ENV: &str = "DERIVATION_START_INDEX";

pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const AUTH_JWT_AUDIENCE_ENV: &str = "AUTH_JWT_AUDIENCE";

pub const BACKEND_URL_ENV: &str = "BACKEND_URL";
pub const BACKEND_SERVICE_KEY_ENV: &str = "BACKEND_SERVICE_KEY";
pub const SEED_USER_IDS_ENV: &str = "SEED_USER_IDS";

pub const CHAIN_NETWORK_ENV: &str = "CHAIN_NETWORK";
pub const CHAIN_RPC_URL_ENV: &str = "CHAIN_RPC_URL";
pub const DEPOSIT_TOKEN_CONTRACTS_ENV: &str = "DEPOSIT_TOKEN_CONTRACTS";
pub const DEPOSIT_CONFIRMATIONS_ENV: &str = "DEPOSIT_CONFIRMATIONS";
pub const RECONCILE_INTERVAL_SECS_ENV: &str = "RECONCILE_INTERVAL_SECS";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_AUDIENCE: &str = "authenticated";
const DEFAULT_CONFIRMATIONS: u64 = 12;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} and {1} are mutually exclusive")]
    Exclusive(&'static str, &'static str),

    #[error("{0} requires {1}")]
    Missing(&'static str, &'static str),
}

/// Where the account xpub comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum MasterKeySource {
    Unset,
    Inline(String),
    File(PathBuf),
}

impl std::fmt::Debug for MasterKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MasterKeySource::Unset => write!(f, "Unset"),
            MasterKeySource::Inline(_) => write!(f, "Inline(<redacted>)"),
            MasterKeySource::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub master_key: MasterKeySource,
    pub account_path: String,
    pub start_index: u32,
    pub auth: AuthConfig,
    pub backend: Option<BackendConfig>,
    pub seed_user_ids: Vec<String>,
    pub network: NetworkConfig,
    pub rpc_url: Option<String>,
    pub token_contracts: Vec<Address>,
    pub confirmations: u64,
    /// `None` disables the background reconciler.
    pub reconcile_interval: Option<Duration>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()));

        let master_key = match (get(MASTER_XPUB_ENV), get(MASTER_XPUB_FILE_ENV)) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Exclusive(MASTER_XPUB_ENV, MASTER_XPUB_FILE_ENV))
            }
            (Some(inline), None) => MasterKeySource::Inline(inline),
            (None, Some(path)) => MasterKeySource::File(PathBuf::from(path)),
            (None, None) => MasterKeySource::Unset,
        };
        let account_path =
            get(MASTER_XPUB_PATH_ENV).unwrap_or_else(|| DEFAULT_ACCOUNT_PATH.to_string());

        let start_index: u32 = parse_or(
            get(DERIVATION_START_INDEX_ENV),
            DERIVATION_START_INDEX_ENV,
            0,
        )?;
        if start_index > MAX_CHILD_INDEX {
            return Err(ConfigError::Invalid {
                var: DERIVATION_START_INDEX_ENV,
                reason: format!("must be at most {MAX_CHILD_INDEX}"),
            });
        }

        let auth = AuthConfig {
            secret: get(AUTH_JWT_SECRET_ENV),
            audience: Some(
                get(AUTH_JWT_AUDIENCE_ENV).unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            ),
        };

        let backend = match (get(BACKEND_URL_ENV), get(BACKEND_SERVICE_KEY_ENV)) {
            (Some(url), Some(service_key)) => Some(BackendConfig { url, service_key }),
            (Some(_), None) => {
                return Err(ConfigError::Missing(
                    BACKEND_URL_ENV,
                    BACKEND_SERVICE_KEY_ENV,
                ))
            }
            (None, _) => None,
        };

        let seed_user_ids = split_list(get(SEED_USER_IDS_ENV));

        let network = match get(CHAIN_NETWORK_ENV) {
            Some(key) => network_by_key(&key).ok_or_else(|| ConfigError::Invalid {
                var: CHAIN_NETWORK_ENV,
                reason: format!("unknown network `{key}`"),
            })?,
            None => BSC_MAINNET,
        };
        let rpc_url = get(CHAIN_RPC_URL_ENV);

        let contract_list = split_list(get(DEPOSIT_TOKEN_CONTRACTS_ENV));
        let contract_list = if contract_list.is_empty() {
            network
                .deposit_tokens
                .iter()
                .map(|t| t.address.to_string())
                .collect()
        } else {
            contract_list
        };
        let token_contracts = contract_list
            .iter()
            .map(|raw| {
                raw.parse::<Address>().map_err(|e| ConfigError::Invalid {
                    var: DEPOSIT_TOKEN_CONTRACTS_ENV,
                    reason: format!("`{raw}`: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let confirmations = parse_or(
            get(DEPOSIT_CONFIRMATIONS_ENV),
            DEPOSIT_CONFIRMATIONS_ENV,
            DEFAULT_CONFIRMATIONS,
        )?;
        let interval_secs = parse_or(
            get(RECONCILE_INTERVAL_SECS_ENV),
            RECONCILE_INTERVAL_SECS_ENV,
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )?;
        let reconcile_interval = (interval_secs > 0).then(|| Duration::from_secs(interval_secs));

        let log_format = match get(LOG_FORMAT_ENV).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host,
            port,
            data_dir,
            master_key,
            account_path,
            start_index,
            auth,
            backend,
            seed_user_ids,
            network,
            rpc_url,
            token_contracts,
            confirmations,
            reconcile_interval,
            log_format,
        })
    }

    /// Load the configured master key, if any.
    ///
    /// `Ok(None)` means no key was configured. A configured key that cannot
    /// be read or parsed is an error.
    pub fn load_master_key(&self) -> Result<Option<MasterKeyMaterial>, DeriveError> {
        match &self.master_key {
            MasterKeySource::Unset => Ok(None),
            MasterKeySource::Inline(encoded) => {
                MasterKeyMaterial::parse(encoded, &self.account_path).map(Some)
            }
            MasterKeySource::File(path) => {
                MasterKeyMaterial::from_file(path, &self.account_path).map(Some)
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("`{value}`: {e}"),
        }),
        None => Ok(default),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
