//! A relayer stand-in acting directly on the mock chains of a [`MockNetwork`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ibc_core_host_types::identifiers::{ClientId, ConnectionId};
use ibc_devnet::chain::{ChainHandle, ConnectionQuery};
use ibc_devnet::error::RelayerError;
use ibc_devnet::handshake::{virtual_port_id, CONNECT_IBC_CHANNEL};
use ibc_devnet::relayer::{ChannelOpenRequest, Relayer, RelayerLauncher};
use ibc_devnet_types::config::ClientPrefixes;
use ibc_devnet_types::event::EventAttributes;
use ibc_devnet_types::path::Path;
use ibc_devnet_types::relayer::{
    PathConfig, PathName, RelayerChainConfig, RelayerConfig, RelayerIdentity, RelayerRole,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::chains::{MockChain, MockVirtualChain};

/// The mock chains of one devnet, by name.
#[derive(Clone, Default)]
pub struct MockNetwork {
    natives: BTreeMap<String, Arc<MockChain>>,
    virtuals: BTreeMap<String, Arc<MockVirtualChain>>,
}

impl MockNetwork {
    pub fn with_native(mut self, chain: MockChain) -> Self {
        self.natives
            .insert(chain.chain_id().to_string(), Arc::new(chain));
        self
    }

    pub fn with_virtual(mut self, chain: MockVirtualChain) -> Self {
        self.virtuals
            .insert(chain.chain_id().to_string(), Arc::new(chain));
        self
    }

    pub fn native(&self, chain_id: &str) -> Option<Arc<MockChain>> {
        self.natives.get(chain_id).cloned()
    }

    pub fn virtual_chain(&self, chain_id: &str) -> Option<Arc<MockVirtualChain>> {
        self.virtuals.get(chain_id).cloned()
    }
}

/// One call a [`MockRelayer`] received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayerCall {
    Init {
        chains: Vec<String>,
        paths: Vec<PathName>,
    },
    DeletePath(PathName),
    Connect(Vec<PathName>),
    Start,
    Channel(ChannelOpenRequest),
    Update {
        path: PathName,
        connection_hops: Vec<ConnectionId>,
    },
}

/// Records every call and performs the chain-side effects a real relayer would.
///
/// - `connect` opens native connections between the two chains of each native path;
/// - `channel` delivers the open-init or open-try of a virtual channel end to the hub;
/// - `start` on the vIBC relayer has the virtual chain report every hub channel end bound to a
///   virtual port once it opens.
pub struct MockRelayer {
    network: MockNetwork,
    prefixes: ClientPrefixes,
    identity: Mutex<RelayerIdentity>,
    calls: Mutex<Vec<RelayerCall>>,
    spawned: Mutex<usize>,
    bridging: Mutex<bool>,
}

impl MockRelayer {
    pub fn new(network: MockNetwork, prefixes: ClientPrefixes, role: RelayerRole) -> Self {
        Self {
            network,
            prefixes,
            identity: Mutex::new(RelayerIdentity::new(role)),
            calls: Mutex::new(Vec::new()),
            spawned: Mutex::new(0),
            bridging: Mutex::new(false),
        }
    }

    pub fn calls(&self) -> Vec<RelayerCall> {
        self.calls.lock().clone()
    }

    /// How many times `start` found no running process and started one.
    pub fn spawned(&self) -> usize {
        *self.spawned.lock()
    }

    /// Takes over the identity the devnet recorded for this relayer.
    pub fn attach(&self, identity: RelayerIdentity) {
        *self.identity.lock() = identity;
    }

    fn record(&self, call: RelayerCall) {
        debug!(relayer = %self.identity.lock().name, ?call, "mock relayer call");
        self.calls.lock().push(call);
    }

    fn failed(&self, command: &str, reason: impl ToString) -> RelayerError {
        RelayerError::CommandFailed {
            relayer: self.identity.lock().name.clone(),
            command: command.to_string(),
            code: None,
            stderr: reason.to_string(),
        }
    }

    fn path(&self, name: &PathName) -> Result<Path, RelayerError> {
        let identity = self.identity.lock();

        identity
            .configuration
            .paths
            .get(name)
            .map(|config| config.path.clone())
            .ok_or_else(|| RelayerError::UnknownPath {
                relayer: identity.name.clone(),
                path: name.clone(),
            })
    }

    fn native(&self, command: &str, chain_id: &str) -> Result<Arc<MockChain>, RelayerError> {
        self.network
            .native(chain_id)
            .ok_or_else(|| self.failed(command, format!("no native chain `{chain_id}`")))
    }

    /// Client the hub keeps for the virtual chain, found the way the hub reports it.
    async fn virtual_client(&self, hub: &MockChain) -> Result<ClientId, RelayerError> {
        let connections = hub
            .connections()
            .await
            .map_err(|e| self.failed("channel", e))?;

        connections
            .into_iter()
            .find(|c| {
                c.client_id.as_str().starts_with(&self.prefixes.virtual_chain)
                    && c.counterparty_client_id.as_str().starts_with(&self.prefixes.hub)
            })
            .map(|c| c.client_id)
            .ok_or_else(|| self.failed("channel", "hub has no virtual client"))
    }

    fn bridge(&self, path: &Path) -> Result<(), RelayerError> {
        let hub = self.native("start", path.src().chain_id())?;
        let virtual_chain = self
            .network
            .virtual_chain(path.dst().chain_id())
            .ok_or_else(|| self.failed("start", "no virtual chain"))?;
        let port_prefix = format!("{}.", self.prefixes.virtual_port);

        hub.on_channel_open(Arc::new(move |port_id, channel_id| {
            let address = port_id
                .as_str()
                .strip_prefix(&port_prefix)
                .and_then(|rest| rest.rsplit('.').next());

            if let Some(address) = address {
                let attributes: EventAttributes = [
                    ("portAddress".to_string(), format!("0x{address}")),
                    ("channelId".to_string(), channel_id.to_string()),
                ]
                .into_iter()
                .collect();
                virtual_chain.emit(CONNECT_IBC_CHANNEL, attributes);
            }
        }));

        Ok(())
    }
}

#[async_trait]
impl Relayer for MockRelayer {
    fn identity(&self) -> RelayerIdentity {
        self.identity.lock().clone()
    }

    async fn init(
        &self,
        chains: Vec<RelayerChainConfig>,
        paths: Vec<(PathName, PathConfig)>,
    ) -> Result<(), RelayerError> {
        self.record(RelayerCall::Init {
            chains: chains.iter().map(|c| c.chain_id.clone()).collect(),
            paths: paths.iter().map(|(name, _)| name.clone()).collect(),
        });

        let mut identity = self.identity.lock();
        for chain in chains {
            identity
                .configuration
                .chains
                .insert(chain.chain_id.clone(), chain);
        }
        identity.configuration.paths.extend(paths);

        Ok(())
    }

    async fn delete_path(&self, path: &PathName) -> Result<(), RelayerError> {
        self.record(RelayerCall::DeletePath(path.clone()));
        self.identity.lock().configuration.paths.remove(path);

        Ok(())
    }

    async fn connect(&self, paths: &[PathName]) -> Result<(), RelayerError> {
        self.record(RelayerCall::Connect(paths.to_vec()));

        let role = self.identity.lock().role;
        if role != RelayerRole::Ibc {
            return Ok(());
        }

        for name in paths {
            let path = self.path(name)?;
            let src = self.native("connect", path.src().chain_id())?;
            let dst = self.native("connect", path.dst().chain_id())?;

            src.connect_to(&dst, &self.prefixes.native)
                .map_err(|e| self.failed("connect", e))?;
        }

        Ok(())
    }

    async fn start(&self) -> Result<(), RelayerError> {
        self.record(RelayerCall::Start);

        let (role, paths) = {
            let mut identity = self.identity.lock();
            if identity.process_id.is_none() {
                identity.process_id = Some(std::process::id());
                *self.spawned.lock() += 1;
            }
            let paths: Vec<Path> = identity
                .configuration
                .paths
                .values()
                .map(|config| config.path.clone())
                .collect();
            (identity.role, paths)
        };

        let mut bridging = self.bridging.lock();
        if role == RelayerRole::VIbc && !*bridging {
            for path in &paths {
                self.bridge(path)?;
            }
            *bridging = true;
        }

        Ok(())
    }

    async fn channel(&self, request: &ChannelOpenRequest) -> Result<(), RelayerError> {
        self.record(RelayerCall::Channel(request.clone()));

        let path = self.path(&request.path)?;
        let hub = self.native("channel", path.src().chain_id())?;
        let client_id = self.virtual_client(&hub).await?;
        let port_id = virtual_port_id(&self.prefixes, &client_id, &request.receiver)
            .map_err(|e| self.failed("channel", e))?;

        match &request.counterparty_channel_id {
            None => hub.deliver_open_init(
                port_id,
                request.ordering,
                request.counterparty_port_id.clone(),
                request.connection_hops.clone(),
                request.version.clone(),
            ),
            Some(counterparty_channel_id) => hub.deliver_open_try(
                port_id,
                request.ordering,
                request.counterparty_port_id.clone(),
                counterparty_channel_id.clone(),
                request.connection_hops.clone(),
                request.version.clone(),
            ),
        };

        Ok(())
    }

    async fn update(
        &self,
        path: &PathName,
        connection_hops: &[ConnectionId],
    ) -> Result<(), RelayerError> {
        self.record(RelayerCall::Update {
            path: path.clone(),
            connection_hops: connection_hops.to_vec(),
        });

        let mut identity = self.identity.lock();
        let relayer = identity.name.clone();
        let entry = identity
            .configuration
            .paths
            .get_mut(path)
            .ok_or_else(|| RelayerError::UnknownPath {
                relayer,
                path: path.clone(),
            })?;
        entry.connection_hops = connection_hops.to_vec();

        Ok(())
    }

    async fn config(&self) -> Result<RelayerConfig, RelayerError> {
        Ok(self.identity.lock().configuration.clone())
    }
}

/// Hands out one [`MockRelayer`] per role, the same one on every launch.
pub struct MockLauncher {
    network: MockNetwork,
    prefixes: ClientPrefixes,
    relayers: Mutex<BTreeMap<RelayerRole, Arc<MockRelayer>>>,
}

impl MockLauncher {
    pub fn new(network: MockNetwork, prefixes: ClientPrefixes) -> Self {
        Self {
            network,
            prefixes,
            relayers: Mutex::new(BTreeMap::new()),
        }
    }

    /// The relayer launched for `role`, if any.
    pub fn relayer(&self, role: RelayerRole) -> Option<Arc<MockRelayer>> {
        self.relayers.lock().get(&role).cloned()
    }
}

#[async_trait]
impl RelayerLauncher for MockLauncher {
    async fn launch(
        &self,
        role: RelayerRole,
        existing: Option<&RelayerIdentity>,
    ) -> Result<Arc<dyn Relayer>, RelayerError> {
        let relayer = self
            .relayers
            .lock()
            .entry(role)
            .or_insert_with(|| {
                Arc::new(MockRelayer::new(
                    self.network.clone(),
                    self.prefixes.clone(),
                    role,
                ))
            })
            .clone();

        if let Some(identity) = existing {
            relayer.attach(identity.clone());
        }

        Ok(relayer)
    }
}
