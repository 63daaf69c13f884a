//! A native chain reached through its Tendermint RPC endpoint.

use async_trait::async_trait;
use ibc_core_host_types::identifiers::{ChannelId, PortId};
use ibc_devnet_types::config::TxConfig;
use ibc_devnet_types::event::{EventsFilter, TxEvent};
use ibc_proto::cosmos::base::abci::v1beta1::TxMsgData;
use ibc_proto::google::protobuf::Any;
use prost::Message;
use tendermint_rpc::query::Query;
use tendermint_rpc::{Client, HttpClient, Order, Url};
use tracing::{debug, info, warn};

use crate::chain::{
    ChainHandle, ChannelInfo, ConnectionInfo, ConnectionQuery, EventSource, NativeChain, TxOutcome,
};
use crate::error::{ChainError, HandshakeError};

pub mod events;
pub mod query;
mod signer;

use events::{has_next_page, EventCollector, SearchedTx};

pub use signer::CosmosSigner;

const TX_SEARCH_PAGE_SIZE: u8 = 100;

#[derive(Clone, Debug)]
pub struct CosmosChain {
    chain_id: String,
    rpc: HttpClient,
    tx_config: TxConfig,
    signer: Option<CosmosSigner>,
}

impl CosmosChain {
    /// A query-only client; attach a signer with [`CosmosChain::with_signer`] to broadcast.
    pub fn new(chain_id: &str, rpc_host: &str, tx_config: TxConfig) -> Result<Self, ChainError> {
        let rpc_error = |source| ChainError::Rpc {
            chain_id: chain_id.to_string(),
            source,
        };

        let url: Url = rpc_host.parse().map_err(rpc_error)?;
        let rpc = HttpClient::new(url).map_err(rpc_error)?;

        Ok(Self {
            chain_id: chain_id.to_string(),
            rpc,
            tx_config,
            signer: None,
        })
    }

    pub fn with_signer(self, signer: CosmosSigner) -> Self {
        Self {
            signer: Some(signer),
            ..self
        }
    }

    fn rpc_error(&self, source: tendermint_rpc::Error) -> ChainError {
        ChainError::Rpc {
            chain_id: self.chain_id.clone(),
            source,
        }
    }

    fn require_signer(&self) -> Result<&CosmosSigner, ChainError> {
        self.signer.as_ref().ok_or_else(|| ChainError::Key {
            chain_id: self.chain_id.clone(),
            reason: "client was opened without a signing key".to_string(),
        })
    }
}

fn height_query(filter: &EventsFilter) -> Query {
    match filter.bounds() {
        (min, Some(max)) if min == max => Query::eq("tx.height", min),
        (min, Some(max)) => Query::gte("tx.height", min).and_lte("tx.height", max),
        (min, None) => Query::gte("tx.height", min),
    }
}

impl ChainHandle for CosmosChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

#[async_trait]
impl EventSource for CosmosChain {
    async fn latest_height(&self) -> Result<u64, HandshakeError> {
        let status = self.rpc.status().await.map_err(|e| self.rpc_error(e))?;

        Ok(status.sync_info.latest_block_height.value())
    }

    async fn events(&self, filter: &EventsFilter) -> Result<Vec<TxEvent>, HandshakeError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let query = height_query(filter);
        let mut collector = EventCollector::default();
        let mut page = 1;

        loop {
            let response = self
                .rpc
                .tx_search(
                    query.clone(),
                    false,
                    page,
                    TX_SEARCH_PAGE_SIZE,
                    Order::Ascending,
                )
                .await
                .map_err(|e| self.rpc_error(e))?;

            for tx in &response.txs {
                let searched = SearchedTx {
                    height: tx.height.value(),
                    failed: tx.tx_result.code.is_err(),
                    log: &tx.tx_result.log,
                    events: &tx.tx_result.events,
                };

                if let Err(e) = collector.push(searched) {
                    warn!(
                        chain_id = %self.chain_id,
                        height = searched.height,
                        error = %e,
                        "dropping events of a height with a malformed transaction log"
                    );
                }
            }

            if !has_next_page(
                page,
                TX_SEARCH_PAGE_SIZE,
                response.txs.len(),
                response.total_count,
            ) {
                break;
            }
            page += 1;
        }

        Ok(collector.finish())
    }
}

#[async_trait]
impl ConnectionQuery for CosmosChain {
    async fn connections(&self) -> Result<Vec<ConnectionInfo>, HandshakeError> {
        query::query_connections(&self.rpc, &self.chain_id).await
    }
}

#[async_trait]
impl NativeChain for CosmosChain {
    fn signer(&self) -> &str {
        self.signer
            .as_ref()
            .map(CosmosSigner::address)
            .unwrap_or_default()
    }

    async fn broadcast(&self, msgs: Vec<Any>) -> Result<TxOutcome, HandshakeError> {
        let signer = self.require_signer()?;
        let (account_number, sequence) =
            query::query_account(&self.rpc, &self.chain_id, signer.address()).await?;

        let type_urls: Vec<_> = msgs.iter().map(|msg| msg.type_url.clone()).collect();
        let tx = signer.sign_tx(
            &self.chain_id,
            account_number,
            sequence,
            msgs,
            &self.tx_config,
        );

        debug!(chain_id = %self.chain_id, sequence, ?type_urls, "broadcasting transaction");

        let response = self
            .rpc
            .broadcast_tx_commit(tx.encode_to_vec())
            .await
            .map_err(|e| self.rpc_error(e))?;

        if response.check_tx.code.is_err() {
            return Err(ChainError::BroadcastFailed {
                chain_id: self.chain_id.clone(),
                code: response.check_tx.code.value(),
                log: response.check_tx.log,
            }
            .into());
        }

        if response.tx_result.code.is_err() {
            return Err(ChainError::BroadcastFailed {
                chain_id: self.chain_id.clone(),
                code: response.tx_result.code.value(),
                log: response.tx_result.log,
            }
            .into());
        }

        let data =
            TxMsgData::decode(response.tx_result.data.as_ref()).map_err(|e| ChainError::Decode {
                chain_id: self.chain_id.clone(),
                what: "transaction message data",
                reason: e.to_string(),
            })?;

        let height = response.height.value();
        info!(chain_id = %self.chain_id, height, hash = %response.hash, "transaction committed");

        Ok(TxOutcome {
            height,
            msg_responses: data.msg_responses,
        })
    }

    async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelInfo>, HandshakeError> {
        query::query_channel(&self.rpc, &self.chain_id, port_id, channel_id).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::single(EventsFilter::at(7), "tx.height = 7")]
    #[case::range(EventsFilter::range(3, 9), "tx.height >= 3 AND tx.height <= 9")]
    #[case::open(EventsFilter { height: None, min_height: 12, max_height: None }, "tx.height >= 12")]
    fn height_queries(#[case] filter: EventsFilter, #[case] expected: &str) {
        assert_eq!(height_query(&filter).to_string(), expected);
    }
}
