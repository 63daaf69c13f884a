//! A small devnet wired to in-memory chains and relayers.
//!
//! The devnet has a hub (`polymer`), two native chains (`wasm`, `osmosis`) and one virtual chain
//! (`eth`). The hub starts out connected to `eth` through a client pair and to `wasm` through a
//! native connection; `osmosis` starts without any connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ibc_core_host_types::identifiers::{ClientId, ConnectionId};
use ibc_devnet::chain::{
    ChainConnector, ConnectionInfo, ConnectionQuery, EventSource, NativeChain,
};
use ibc_devnet::devnet::{Devnet, RuntimeStore};
use ibc_devnet::error::HandshakeError;
use ibc_devnet_types::chain::{AccountRecord, ChainRecord, ChainType, ContractRecord, NodeRecord};
use ibc_devnet_types::config::{HandshakeConfig, PollConfig};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::runtime::DevnetRuntime;
use parking_lot::Mutex;

use crate::chains::{MockChain, MockVirtualChain};
use crate::relayer::{MockLauncher, MockNetwork};

pub const HUB: &str = "polymer";
pub const WASM: &str = "wasm";
pub const OSMOSIS: &str = "osmosis";
pub const ETH: &str = "eth";

/// The application contract on `eth` channels are opened for.
pub const DAPP_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const DISPATCHER_ADDRESS: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
pub const WASM_PORT: &str = "wasm.wasm1devnetcontract";

/// Hands out the chains of a [`MockNetwork`] in place of RPC clients.
pub struct MockConnector {
    network: MockNetwork,
}

impl MockConnector {
    pub fn new(network: MockNetwork) -> Self {
        Self { network }
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn connections(
        &self,
        chain: &ChainRecord,
        _config: &HandshakeConfig,
    ) -> Result<Arc<dyn ConnectionQuery>, HandshakeError> {
        let native = self
            .network
            .native(&chain.name)
            .ok_or_else(|| DevnetError::UnknownChain {
                chain_id: chain.name.clone(),
            })?;

        Ok(native)
    }

    async fn native(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn NativeChain>, HandshakeError> {
        chain.account(&config.test_account)?;

        let native = self
            .network
            .native(&chain.name)
            .ok_or_else(|| DevnetError::UnknownChain {
                chain_id: chain.name.clone(),
            })?;

        Ok(native)
    }

    async fn dispatcher(
        &self,
        chain: &ChainRecord,
        config: &HandshakeConfig,
    ) -> Result<Arc<dyn EventSource>, HandshakeError> {
        chain.contract(&config.dispatcher_contract)?;

        let source = self
            .network
            .virtual_chain(&chain.name)
            .ok_or_else(|| DevnetError::UnknownChain {
                chain_id: chain.name.clone(),
            })?;

        Ok(source)
    }
}

/// Keeps every saved runtime record in memory.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<DevnetRuntime>>,
}

impl MemoryStore {
    /// Every saved record, oldest first.
    pub fn saved(&self) -> Vec<DevnetRuntime> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl RuntimeStore for MemoryStore {
    async fn save(&self, runtime: &DevnetRuntime) -> Result<(), HandshakeError> {
        self.saved.lock().push(runtime.clone());
        Ok(())
    }
}

fn native_record(name: &str, chain_type: ChainType) -> ChainRecord {
    ChainRecord {
        name: name.to_string(),
        chain_type,
        nodes: vec![NodeRecord {
            label: format!("{name}-0"),
            rpc_host: format!("http://{name}:26657"),
        }],
        accounts: vec![AccountRecord {
            name: "alice".to_string(),
            address: format!("{name}1alice"),
            mnemonic: None,
        }],
        contracts: Vec::new(),
    }
}

/// The chain records the devnet launcher would have written for the mock network.
pub fn devnet_runtime() -> DevnetRuntime {
    let eth = ChainRecord {
        name: ETH.to_string(),
        chain_type: ChainType::Ethereum,
        nodes: vec![NodeRecord {
            label: "geth".to_string(),
            rpc_host: "http://eth:8545".to_string(),
        }],
        accounts: Vec::new(),
        contracts: vec![ContractRecord {
            name: "Dispatcher".to_string(),
            address: DISPATCHER_ADDRESS.to_string(),
        }],
    };

    DevnetRuntime {
        chain_sets: vec![
            native_record(HUB, ChainType::Polymer),
            native_record(WASM, ChainType::Cosmos),
            native_record(OSMOSIS, ChainType::Cosmos),
            eth,
        ],
        ..DevnetRuntime::default()
    }
}

/// Polls often enough for tests running on paused time.
pub fn test_config() -> HandshakeConfig {
    HandshakeConfig::builder()
        .poll(
            PollConfig::builder()
                .retries(5)
                .interval(Duration::from_secs(1))
                .build(),
        )
        .build()
}

fn client_id(prefix: &str) -> ClientId {
    format!("{prefix}-0").parse().expect("valid client id")
}

pub struct DevnetFixture {
    pub network: MockNetwork,
    pub connector: Arc<MockConnector>,
    pub launcher: Arc<MockLauncher>,
    pub store: Arc<MemoryStore>,
    pub runtime: DevnetRuntime,
    pub config: HandshakeConfig,
}

impl DevnetFixture {
    pub fn new() -> Self {
        let config = test_config();
        let prefixes = &config.prefixes;

        let hub = MockChain::new(HUB);
        hub.add_connection(ConnectionInfo {
            connection_id: ConnectionId::new(0),
            client_id: client_id(&prefixes.hub),
            counterparty_client_id: client_id(&prefixes.virtual_chain),
            counterparty_connection_id: Some(ConnectionId::new(1)),
        });
        hub.add_connection(ConnectionInfo {
            connection_id: ConnectionId::new(1),
            client_id: client_id(&prefixes.virtual_chain),
            counterparty_client_id: client_id(&prefixes.hub),
            counterparty_connection_id: Some(ConnectionId::new(0)),
        });

        let wasm = MockChain::new(WASM);
        hub.connect_to(&wasm, &prefixes.native)
            .expect("fresh chains accept connections");

        let network = MockNetwork::default()
            .with_native(hub)
            .with_native(wasm)
            .with_native(MockChain::new(OSMOSIS))
            .with_virtual(MockVirtualChain::new(ETH));

        Self {
            connector: Arc::new(MockConnector::new(network.clone())),
            launcher: Arc::new(MockLauncher::new(network.clone(), config.prefixes.clone())),
            store: Arc::new(MemoryStore::default()),
            runtime: devnet_runtime(),
            network,
            config,
        }
    }

    pub fn native(&self, chain_id: &str) -> Arc<MockChain> {
        self.network
            .native(chain_id)
            .expect("native chain of the fixture")
    }

    pub fn virtual_chain(&self, chain_id: &str) -> Arc<MockVirtualChain> {
        self.network
            .virtual_chain(chain_id)
            .expect("virtual chain of the fixture")
    }

    /// A devnet over the fixture's chains, relayers and store.
    pub fn devnet(&self) -> Devnet {
        Devnet::new(
            self.runtime.clone(),
            self.connector.clone(),
            self.launcher.clone(),
            self.store.clone(),
            self.config.clone(),
        )
    }
}

impl Default for DevnetFixture {
    fn default() -> Self {
        Self::new()
    }
}
