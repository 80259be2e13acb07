// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM JSON-RPC client for deposit discovery.
//!
//! Read-only: only `eth_blockNumber` and `eth_getLogs` are used. There is no
//! signer and no private key anywhere in this client.

use alloy::{
    network::Ethereum,
    primitives::{Address, FixedBytes, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::{Filter, Log},
};

use super::types::NetworkConfig;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: FixedBytes<32> = FixedBytes::new([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
]);

/// HTTP provider type (with the default fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// A decoded ERC-20 `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub token_contract: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// Read-only chain client.
pub struct ChainClient {
    network: NetworkConfig,
    provider: HttpProvider,
}

impl ChainClient {
    /// Connect to `network`, optionally overriding its default RPC URL.
    pub fn new(network: NetworkConfig, rpc_url: Option<&str>) -> Result<Self, ChainClientError> {
        let raw = rpc_url.unwrap_or(network.rpc_url);
        let url: url::Url = raw
            .parse()
            .map_err(|e: url::ParseError| ChainClientError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self { network, provider })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> Result<u64, ChainClientError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }

    /// `Transfer` logs from `contracts` whose recipient is `to`, in
    /// `[from_block, to_block]`.
    pub async fn transfers_to(
        &self,
        to: Address,
        contracts: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, ChainClientError> {
        if contracts.is_empty() || from_block > to_block {
            return Ok(Vec::new());
        }

        let filter = Filter::new()
            .address(contracts.to_vec())
            .event_signature(TRANSFER_TOPIC)
            .topic2(to.into_word())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))?;

        Ok(logs.iter().filter_map(decode_transfer).collect())
    }
}

/// Decode a `Transfer` log. Returns `None` for anything that is not a
/// mined, well-formed transfer.
pub fn decode_transfer(log: &Log) -> Option<TransferLog> {
    if log.removed {
        return None;
    }

    // Transfer event has 3 topics: [event_sig, from, to] and data = value
    let topics = log.topics();
    if topics.len() < 3 || topics[0] != TRANSFER_TOPIC {
        return None;
    }

    let data = &log.data().data;
    if data.len() < 32 {
        return None;
    }

    Some(TransferLog {
        tx_hash: format!("{:#x}", log.transaction_hash?),
        log_index: log.log_index?,
        block_number: log.block_number?,
        token_contract: log.address(),
        from: Address::from_word(topics[1]),
        to: Address::from_word(topics[2]),
        value: U256::from_be_slice(&data[..32]),
    })
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("RPC error: {0}")]
    RpcError(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy::primitives::{Bytes, B256};

    use super::*;

    pub(crate) fn transfer_log(
        contract: Address,
        from: Address,
        to: Address,
        value: U256,
        tx_hash: B256,
        log_index: u64,
        block_number: u64,
    ) -> Log {
        let mut log = Log::default();
        log.inner = alloy::primitives::Log::new_unchecked(
            contract,
            vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
            Bytes::from(value.to_be_bytes::<32>().to_vec()),
        );
        log.transaction_hash = Some(tx_hash);
        log.log_index = Some(log_index);
        log.block_number = Some(block_number);
        log
    }

    #[test]
    fn transfer_topic_is_correct() {
        let expected = alloy::primitives::keccak256("Transfer(address,address,uint256)");
        assert_eq!(TRANSFER_TOPIC, expected);
    }

    #[test]
    fn decodes_transfer_log() {
        let contract = Address::repeat_byte(0x55);
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let log = transfer_log(
            contract,
            from,
            to,
            U256::from(1_500_000u64),
            B256::repeat_byte(0xab),
            3,
            1_000,
        );

        let decoded = decode_transfer(&log).unwrap();
        assert_eq!(decoded.token_contract, contract);
        assert_eq!(decoded.from, from);
        assert_eq!(decoded.to, to);
        assert_eq!(decoded.value, U256::from(1_500_000u64));
        assert_eq!(decoded.log_index, 3);
        assert_eq!(decoded.block_number, 1_000);
        assert_eq!(decoded.tx_hash, format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn skips_removed_and_pending_logs() {
        let mut log = transfer_log(
            Address::repeat_byte(0x55),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            U256::from(1u64),
            B256::repeat_byte(0xab),
            0,
            1,
        );
        log.removed = true;
        assert_eq!(decode_transfer(&log), None);

        log.removed = false;
        log.block_number = None;
        assert_eq!(decode_transfer(&log), None);
    }

    #[test]
    fn skips_non_transfer_logs() {
        let mut log = Log::default();
        log.inner = alloy::primitives::Log::new_unchecked(
            Address::repeat_byte(0x55),
            vec![B256::repeat_byte(0x11)],
            Bytes::new(),
        );
        log.transaction_hash = Some(B256::repeat_byte(0xab));
        assert_eq!(decode_transfer(&log), None);
    }

    #[test]
    fn rejects_bad_rpc_url() {
        assert!(matches!(
            ChainClient::new(crate::blockchain::BSC_MAINNET, Some("not a url")),
            Err(ChainClientError::InvalidRpcUrl(_))
        ));
        let client = ChainClient::new(crate::blockchain::BSC_TESTNET, None).unwrap();
        assert_eq!(client.network().chain_id, 97);
    }
}
