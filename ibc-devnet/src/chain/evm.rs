//! Events of the dispatcher contract on a virtual (EVM) chain.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEventInterface;
use alloy::transports::http::reqwest::Url;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use ibc_devnet_types::event::{group_by_height, EventAttributes, EventsFilter, TxEvent};

use crate::chain::{ChainHandle, EventSource};
use crate::error::{ChainError, HandshakeError};

sol! {
    interface IDispatcher {
        event OpenIbcChannel(
            address indexed portAddress,
            string version,
            uint8 ordering,
            bool feeEnabled,
            string[] connectionHops,
            string counterpartyPortId,
            bytes32 counterpartyChannelId
        );
        event ConnectIbcChannel(address indexed portAddress, bytes32 channelId);
        event CloseIbcChannel(address indexed portAddress, bytes32 indexed channelId);
        event SendPacket(
            address indexed sourcePortAddress,
            bytes32 indexed sourceChannelId,
            bytes packet,
            uint64 sequence,
            uint64 timeoutTimestamp
        );
        event Acknowledgement(
            address indexed sourcePortAddress,
            bytes32 indexed sourceChannelId,
            uint64 sequence
        );
    }
}

use IDispatcher::IDispatcherEvents;

/// Reads the logs of one dispatcher contract over JSON-RPC.
#[derive(Clone, Debug)]
pub struct DispatcherEvents {
    chain_id: String,
    dispatcher: Address,
    provider: RootProvider<Http<Client>>,
}

impl DispatcherEvents {
    pub fn new(chain_id: &str, rpc_host: &str, dispatcher: &str) -> Result<Self, ChainError> {
        let evm_error = |reason: String| ChainError::Evm {
            chain_id: chain_id.to_string(),
            reason,
        };

        let url = rpc_host
            .parse::<Url>()
            .map_err(|e| evm_error(e.to_string()))?;
        let dispatcher = dispatcher
            .parse::<Address>()
            .map_err(|e| evm_error(e.to_string()))?;

        Ok(Self {
            chain_id: chain_id.to_string(),
            dispatcher,
            provider: ProviderBuilder::new().on_http(url),
        })
    }

    fn evm_error(&self, reason: impl ToString) -> ChainError {
        ChainError::Evm {
            chain_id: self.chain_id.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Channel identifiers travel as right-padded `bytes32` strings.
fn bytes32_string(value: &B256) -> String {
    let trimmed: Vec<u8> = value
        .iter()
        .copied()
        .take_while(|byte| *byte != 0)
        .collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

fn attributes<const N: usize>(pairs: [(&str, String); N]) -> EventAttributes {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Name and attributes of a decoded dispatcher event.
pub fn describe(event: &IDispatcherEvents) -> (&'static str, EventAttributes) {
    match event {
        IDispatcherEvents::OpenIbcChannel(e) => (
            "OpenIbcChannel",
            attributes([
                ("portAddress", e.portAddress.to_string()),
                ("version", e.version.clone()),
                ("ordering", e.ordering.to_string()),
                ("feeEnabled", e.feeEnabled.to_string()),
                ("connectionHops", e.connectionHops.join(".")),
                ("counterpartyPortId", e.counterpartyPortId.clone()),
                ("counterpartyChannelId", bytes32_string(&e.counterpartyChannelId)),
            ]),
        ),
        IDispatcherEvents::ConnectIbcChannel(e) => (
            "ConnectIbcChannel",
            attributes([
                ("portAddress", e.portAddress.to_string()),
                ("channelId", bytes32_string(&e.channelId)),
            ]),
        ),
        IDispatcherEvents::CloseIbcChannel(e) => (
            "CloseIbcChannel",
            attributes([
                ("portAddress", e.portAddress.to_string()),
                ("channelId", bytes32_string(&e.channelId)),
            ]),
        ),
        IDispatcherEvents::SendPacket(e) => (
            "SendPacket",
            attributes([
                ("sourcePortAddress", e.sourcePortAddress.to_string()),
                ("sourceChannelId", bytes32_string(&e.sourceChannelId)),
                ("packet", alloy::hex::encode(&e.packet)),
                ("sequence", e.sequence.to_string()),
                ("timeoutTimestamp", e.timeoutTimestamp.to_string()),
            ]),
        ),
        IDispatcherEvents::Acknowledgement(e) => (
            "Acknowledgement",
            attributes([
                ("sourcePortAddress", e.sourcePortAddress.to_string()),
                ("sourceChannelId", bytes32_string(&e.sourceChannelId)),
                ("sequence", e.sequence.to_string()),
            ]),
        ),
    }
}

impl DispatcherEvents {
    /// Decodes one log. A log the dispatcher interface does not describe is an error.
    fn decode(&self, log: &Log) -> Result<(u64, &'static str, EventAttributes), ChainError> {
        let height = log
            .block_number
            .ok_or_else(|| self.evm_error("log of a pending block"))?;
        let decoded =
            IDispatcherEvents::decode_log(&log.inner, true).map_err(|e| self.evm_error(e))?;
        let (name, attributes) = describe(&decoded.data);

        Ok((height, name, attributes))
    }
}

impl ChainHandle for DispatcherEvents {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

#[async_trait]
impl EventSource for DispatcherEvents {
    async fn latest_height(&self) -> Result<u64, HandshakeError> {
        Ok(self
            .provider
            .get_block_number()
            .await
            .map_err(|e| self.evm_error(e))?)
    }

    async fn events(&self, filter: &EventsFilter) -> Result<Vec<TxEvent>, HandshakeError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let (from, to) = filter.bounds();
        let mut query = Filter::new().address(self.dispatcher).from_block(from);
        if let Some(to) = to {
            query = query.to_block(to);
        }

        let logs = self
            .provider
            .get_logs(&query)
            .await
            .map_err(|e| self.evm_error(e))?;

        let decoded = logs
            .iter()
            .map(|log| {
                self.decode(log)
                    .map(|(height, name, attributes)| (height, name.to_string(), attributes))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(group_by_height(decoded))
    }
}
