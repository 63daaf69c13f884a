//! The surfaces handshake code consumes from a running chain.
//!
//! A native chain answers event, connection and channel queries and accepts signed transactions.
//! A virtual chain only reports the events of its dispatcher contract; everything it does on the
//! IBC side happens through a relayer and the hub.

use std::sync::Arc;

use async_trait::async_trait;
use ibc_core_channel_types::channel::{Order, State};
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId};
use ibc_devnet_types::chain::ChainRecord;
use ibc_devnet_types::config::HandshakeConfig;
use ibc_devnet_types::event::{EventsFilter, TxEvent};
use ibc_proto::google::protobuf::Any;

use crate::error::HandshakeError;

pub mod cosmos;
pub mod evm;

pub use cosmos::{CosmosChain, CosmosSigner};
pub use evm::DispatcherEvents;

pub trait ChainHandle: Send + Sync {
    /// Name of the chain in the devnet records.
    fn chain_id(&self) -> &str;
}

/// Reports what happened on a chain, one [`TxEvent`] per height.
#[async_trait]
pub trait EventSource: ChainHandle {
    async fn latest_height(&self) -> Result<u64, HandshakeError>;

    /// Heights without a relevant event are left out; the rest come in ascending order.
    async fn events(&self, filter: &EventsFilter) -> Result<Vec<TxEvent>, HandshakeError>;
}

/// A connection end as stored on the chain it was queried from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub client_id: ClientId,
    pub counterparty_client_id: ClientId,
    /// Unset until the counterparty side of the handshake happened.
    pub counterparty_connection_id: Option<ConnectionId>,
}

#[async_trait]
pub trait ConnectionQuery: ChainHandle {
    async fn connections(&self) -> Result<Vec<ConnectionInfo>, HandshakeError>;
}

/// A channel end as stored on the chain it was queried from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub state: State,
    pub ordering: Order,
    pub counterparty_port_id: PortId,
    pub counterparty_channel_id: Option<ChannelId>,
    pub connection_hops: Vec<ConnectionId>,
    pub version: Version,
}

/// Result of a committed transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TxOutcome {
    pub height: u64,
    pub msg_responses: Vec<Any>,
}

impl TxOutcome {
    pub fn response(&self, type_url: &str) -> Option<&Any> {
        self.msg_responses
            .iter()
            .find(|response| response.type_url == type_url)
    }
}

/// A chain running the IBC core modules, signing as the devnet's test account.
#[async_trait]
pub trait NativeChain: EventSource + ConnectionQuery {
    /// Address of the account signing every transaction.
    fn signer(&self) -> &str;

    /// Signs and submits `msgs` in one transaction, returning once it is committed.
    ///
    /// A transaction rejected by the chain is an error; nothing is retried.
    async fn broadcast(&self, msgs: Vec<Any>) -> Result<TxOutcome, HandshakeError>;

    async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelInfo>, HandshakeError>;
}

/// Opens clients to the chains of a running devnet.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// A query-only handle on a native chain; needs no signing key.
    async fn connections(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn ConnectionQuery>, HandshakeError>;

    async fn native(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn NativeChain>, HandshakeError>;

    /// Event source of a virtual chain's dispatcher contract.
    async fn dispatcher(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn EventSource>, HandshakeError>;
}

/// Connects over the chains' RPC endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcConnector;

#[async_trait]
impl ChainConnector for RpcConnector {
    async fn connections(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn ConnectionQuery>, HandshakeError> {
        let client = CosmosChain::new(&chain.name, chain.rpc_host()?, config.tx.clone())?;

        Ok(Arc::new(client))
    }

    async fn native(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn NativeChain>, HandshakeError> {
        let account = chain.account(&config.test_account)?;
        let signer = CosmosSigner::from_account(&chain.name, account, &config.tx)?;
        let client = CosmosChain::new(&chain.name, chain.rpc_host()?, config.tx.clone())?
            .with_signer(signer);

        Ok(Arc::new(client))
    }

    async fn dispatcher(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn EventSource>, HandshakeError> {
        let contract = chain.contract(&config.dispatcher_contract)?;
        let source = DispatcherEvents::new(&chain.name, chain.rpc_host()?, &contract.address)?;

        Ok(Arc::new(source))
    }
}
