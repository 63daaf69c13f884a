//! Relayer processes: the surface handshake code drives them through, and the coordination of
//! which process serves which chain pair.

use std::sync::Arc;

use async_trait::async_trait;
use ibc_core_channel_types::channel::Order;
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ConnectionId, PortId};
use ibc_devnet_types::relayer::{
    PathConfig, PathName, RelayerChainConfig, RelayerConfig, RelayerIdentity, RelayerRole,
};

use crate::error::RelayerError;

mod exec;
mod paths;
mod setup;

pub use exec::{ExecLauncher, ExecRelayer};
pub use paths::configure_paths;
pub use setup::{connect_native_path, setup_eth_relayer, setup_ibc_relayer, setup_vibc_relayer};

/// Asks a relayer to open a channel end on the virtual chain of `path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOpenRequest {
    pub path: PathName,
    /// Application contract the channel end is bound to.
    pub receiver: String,
    pub version: Version,
    pub ordering: Order,
    pub connection_hops: Vec<ConnectionId>,
    pub counterparty_port_id: PortId,
    /// Set when the counterparty already initiated, which makes this end an open-try.
    pub counterparty_channel_id: Option<ChannelId>,
}

/// A relayer process, new or already running.
///
/// Every call returns once the process acknowledged it; only [`Relayer::start`] leaves something
/// running in the background.
#[async_trait]
pub trait Relayer: Send + Sync {
    /// What the devnet records about this relayer.
    fn identity(&self) -> RelayerIdentity;

    /// Writes the chains and paths the relayer serves, keeping paths configured before.
    async fn init(
        &self,
        chains: Vec<RelayerChainConfig>,
        paths: Vec<(PathName, PathConfig)>,
    ) -> Result<(), RelayerError>;

    async fn delete_path(&self, path: &PathName) -> Result<(), RelayerError>;

    /// Creates clients and connections for every path in `paths`.
    async fn connect(&self, paths: &[PathName]) -> Result<(), RelayerError>;

    async fn start(&self) -> Result<(), RelayerError>;

    async fn channel(&self, request: &ChannelOpenRequest) -> Result<(), RelayerError>;

    async fn update(
        &self,
        path: &PathName,
        connection_hops: &[ConnectionId],
    ) -> Result<(), RelayerError>;

    async fn config(&self) -> Result<RelayerConfig, RelayerError>;
}

/// Creates relayers, or attaches to the ones the devnet already runs.
#[async_trait]
pub trait RelayerLauncher: Send + Sync {
    async fn launch(
        &self,
        role: RelayerRole,
        existing: Option<&RelayerIdentity>,
    ) -> Result<Arc<dyn Relayer>, RelayerError>;
}
