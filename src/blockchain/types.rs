// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use alloy::primitives::U256;

/// EVM network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Short identifier used in configuration and checkpoint keys
    pub key: &'static str,
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Default RPC endpoint URL
    pub rpc_url: &'static str,
    /// Tokens watched for deposits unless overridden
    pub deposit_tokens: &'static [Erc20Token],
}

/// Known ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Token {
    pub symbol: &'static str,
    pub decimals: u8,
    pub address: &'static str,
}

/// BNB Smart Chain mainnet.
pub const BSC_MAINNET: NetworkConfig = NetworkConfig {
    key: "bsc",
    name: "BNB Smart Chain",
    chain_id: 56,
    rpc_url: "https://bsc-dataseed.bnbchain.org",
    deposit_tokens: &[
        Erc20Token {
            symbol: "USDT",
            decimals: 18,
            address: "0x55d398326f99059fF775485246999027B3197955",
        },
        Erc20Token {
            symbol: "USDC",
            decimals: 18,
            address: "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
        },
    ],
};

/// BNB Smart Chain testnet.
pub const BSC_TESTNET: NetworkConfig = NetworkConfig {
    key: "bsc-testnet",
    name: "BNB Smart Chain Testnet",
    chain_id: 97,
    rpc_url: "https://data-seed-prebsc-1-s1.bnbchain.org:8545",
    deposit_tokens: &[Erc20Token {
        symbol: "USDT",
        decimals: 18,
        address: "0x337610d27c682E347C9cD60BD4b3b107C9d34dDd",
    }],
};

/// Ethereum mainnet.
pub const ETHEREUM_MAINNET: NetworkConfig = NetworkConfig {
    key: "ethereum",
    name: "Ethereum",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    deposit_tokens: &[
        Erc20Token {
            symbol: "USDT",
            decimals: 6,
            address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        },
        Erc20Token {
            symbol: "USDC",
            decimals: 6,
            address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        },
    ],
};

/// Ethereum Sepolia testnet.
pub const ETHEREUM_SEPOLIA: NetworkConfig = NetworkConfig {
    key: "sepolia",
    name: "Ethereum Sepolia",
    chain_id: 11155111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    deposit_tokens: &[Erc20Token {
        symbol: "USDC",
        decimals: 6,
        address: "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
    }],
};

/// All supported networks.
pub const NETWORKS: [NetworkConfig; 4] = [
    BSC_MAINNET,
    BSC_TESTNET,
    ETHEREUM_MAINNET,
    ETHEREUM_SEPOLIA,
];

/// Look up a network by its configuration key (case-insensitive).
pub fn network_by_key(key: &str) -> Option<NetworkConfig> {
    let key = key.trim().to_ascii_lowercase();
    NETWORKS.into_iter().find(|n| n.key == key)
}

impl NetworkConfig {
    /// Decimals of a watched token; unknown contracts default to 18.
    pub fn token_decimals(&self, contract: &str) -> u8 {
        self.deposit_tokens
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(contract))
            .map(|t| t.decimals)
            .unwrap_or(18)
    }
}

/// Format a raw token amount with `decimals`, without losing precision.
///
/// Trailing zeros in the fractional part are trimmed.
pub fn format_amount(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
