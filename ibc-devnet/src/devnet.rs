//! The entry points a devnet launcher calls once its chains are running.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ibc_devnet_types::config::HandshakeConfig;
use ibc_devnet_types::endpoint::{ChannelOutcome, ChannelRequest};
use ibc_devnet_types::relayer::{ChainPair, RelayingPaths};
use ibc_devnet_types::runtime::DevnetRuntime;
use tracing::info;

use crate::chain::ChainConnector;
use crate::error::HandshakeError;
use crate::flow::FlowContext;
use crate::relayer::{
    configure_paths, setup_eth_relayer, setup_ibc_relayer, setup_vibc_relayer, RelayerLauncher,
};

/// Where the devnet runtime record is saved after relayers changed.
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    async fn save(&self, runtime: &DevnetRuntime) -> Result<(), HandshakeError>;
}

/// Keeps the runtime record as a pretty-printed JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn persist_error(&self, source: std::io::Error) -> HandshakeError {
        HandshakeError::Persist {
            file: self.path.clone(),
            source,
        }
    }

    pub async fn load(&self) -> Result<DevnetRuntime, HandshakeError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.persist_error(e))?;

        Ok(DevnetRuntime::from_json(&raw)?)
    }
}

#[async_trait]
impl RuntimeStore for JsonFileStore {
    async fn save(&self, runtime: &DevnetRuntime) -> Result<(), HandshakeError> {
        let raw = runtime.to_json()?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persist_error(e))?;
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| self.persist_error(e))?;

        Ok(())
    }
}

/// A running devnet together with the collaborators handshakes reach out to.
pub struct Devnet {
    runtime: DevnetRuntime,
    connector: Arc<dyn ChainConnector>,
    launcher: Arc<dyn RelayerLauncher>,
    store: Arc<dyn RuntimeStore>,
    config: HandshakeConfig,
}

impl Devnet {
    pub fn new(
        runtime: DevnetRuntime,
        connector: Arc<dyn ChainConnector>,
        launcher: Arc<dyn RelayerLauncher>,
        store: Arc<dyn RuntimeStore>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            runtime,
            connector,
            launcher,
            store,
            config,
        }
    }

    pub fn runtime(&self) -> &DevnetRuntime {
        &self.runtime
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    fn flow(&self) -> FlowContext<'_> {
        FlowContext {
            runtime: &self.runtime,
            connector: self.connector.as_ref(),
            launcher: self.launcher.as_ref(),
            config: &self.config,
        }
    }

    /// Configures the relayers serving `connections`, then records and saves their identities.
    ///
    /// The three relayers are set up concurrently; the runtime record only changes after all of
    /// them succeeded.
    pub async fn setup_relayers(
        &mut self,
        connections: &[ChainPair],
    ) -> Result<RelayingPaths, HandshakeError> {
        let paths = configure_paths(&self.runtime, connections)?;

        let (ibc, vibc, eth) = {
            let runtime = &self.runtime;
            let connector = self.connector.as_ref();
            let launcher = self.launcher.as_ref();
            let config = &self.config;

            tokio::try_join!(
                setup_ibc_relayer(runtime, connector, launcher, &paths.ibc, config),
                setup_vibc_relayer(runtime, launcher, &paths.vibc, config),
                setup_eth_relayer(runtime, launcher, &paths.eth2, config),
            )?
        };

        self.runtime
            .record_relayers(ibc.into_iter().chain(vibc).chain(eth));
        self.store.save(&self.runtime).await?;

        info!(
            ibc = paths.ibc.len(),
            vibc = paths.vibc.len(),
            eth2 = paths.eth2.len(),
            "relayers configured"
        );

        Ok(paths)
    }

    /// Runs a complete channel handshake between the endpoints of `request`.
    ///
    /// Relayers the handshake started or reconfigured are recorded and saved, also when the
    /// handshake fails after touching them.
    pub async fn create_channel(
        &mut self,
        request: &ChannelRequest,
    ) -> Result<ChannelOutcome, HandshakeError> {
        let mut relayers = Vec::new();
        let opened = self.flow().open_channel(request, &mut relayers).await;

        if !relayers.is_empty() {
            self.runtime.record_relayers(relayers);
            self.store.save(&self.runtime).await?;
        }

        let outcome = opened?;

        info!(
            a = %outcome.a.chain,
            a_channel = %outcome.a.channel_id,
            b = %outcome.b.chain,
            b_channel = %outcome.b.channel_id,
            "channel open"
        );

        Ok(outcome)
    }
}
