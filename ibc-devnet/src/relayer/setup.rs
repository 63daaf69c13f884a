use ibc_core_host_types::identifiers::ConnectionId;
use ibc_devnet_types::chain::ChainRecord;
use ibc_devnet_types::config::{ClientPrefixes, HandshakeConfig, PollConfig};
use ibc_devnet_types::path::{Path, PathEnd};
use ibc_devnet_types::relayer::{
    ChainPair, PathConfig, PathName, RelayerChainConfig, RelayerIdentity, RelayerRole,
};
use ibc_devnet_types::runtime::DevnetRuntime;
use tracing::{debug, info};

use crate::chain::{ChainConnector, ConnectionQuery};
use crate::error::HandshakeError;
use crate::path::{ibc_path_from_chain_clients, native_connections};
use crate::poll::Poller;
use crate::relayer::{Relayer, RelayerLauncher};

/// Chain configurations of every chain the pairs mention, each listed once.
fn chain_configs(
    runtime: &DevnetRuntime,
    pairs: &[ChainPair],
    config: &HandshakeConfig,
) -> Result<Vec<RelayerChainConfig>, HandshakeError> {
    let mut records: Vec<&ChainRecord> = Vec::new();

    for name in pairs.iter().flat_map(|p| [&p.src, &p.dst]) {
        let record = runtime.chain(name)?;
        if !records.iter().any(|r| r.name == record.name) {
            records.push(record);
        }
    }

    Ok(records
        .into_iter()
        .map(|record| RelayerChainConfig::from_record(record, &config.dispatcher_contract))
        .collect::<Result<_, _>>()?)
}

fn direct_paths(pairs: &[ChainPair]) -> Vec<(PathName, PathConfig)> {
    pairs
        .iter()
        .map(|pair| {
            let path = Path::direct(PathEnd::new(&pair.src), PathEnd::new(&pair.dst));
            (pair.path_name(), PathConfig::new(path))
        })
        .collect()
}

/// Configures the relayer serving native chain pairs, connects every pair and starts it.
///
/// A relayer the devnet already runs is reused: the paths it served before are deleted and
/// replaced by `pairs`.
pub async fn setup_ibc_relayer(
    runtime: &DevnetRuntime,
    connector: &dyn ChainConnector,
    launcher: &dyn RelayerLauncher,
    pairs: &[ChainPair],
    config: &HandshakeConfig,
) -> Result<Option<RelayerIdentity>, HandshakeError> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let relayer = launcher
        .launch(RelayerRole::Ibc, runtime.relayers.get(RelayerRole::Ibc))
        .await?;

    let previous = relayer.config().await?;
    for path in previous.paths.keys() {
        debug!(relayer = %relayer.identity().name, %path, "deleting previous path");
        relayer.delete_path(path).await?;
    }

    let paths = pairs
        .iter()
        .map(|pair| {
            let path = ibc_path_from_chain_clients(&pair.src, &pair.dst);
            (pair.path_name(), PathConfig::new(path))
        })
        .collect();
    relayer
        .init(chain_configs(runtime, pairs, config)?, paths)
        .await?;

    for pair in pairs {
        let src = connector
            .connections(runtime.chain(&pair.src)?, config)
            .await?;
        let dst = connector
            .connections(runtime.chain(&pair.dst)?, config)
            .await?;
        let name = pair.path_name();

        let (src_connection, _) = connect_native_path(
            relayer.as_ref(),
            &name,
            src.as_ref(),
            dst.as_ref(),
            &config.prefixes,
            config.poll,
        )
        .await?;

        relayer.update(&name, &[src_connection]).await?;
    }

    relayer.start().await?;

    let identity = relayer.identity();
    info!(relayer = %identity.name, paths = pairs.len(), "ibc relayer ready");

    Ok(Some(identity))
}

/// Configures the relayer carrying hub messages to virtual chains and creates their clients and
/// connections.
///
/// The relayer is left stopped; it starts once a channel's connection hops are known.
pub async fn setup_vibc_relayer(
    runtime: &DevnetRuntime,
    launcher: &dyn RelayerLauncher,
    pairs: &[ChainPair],
    config: &HandshakeConfig,
) -> Result<Option<RelayerIdentity>, HandshakeError> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let relayer = launcher
        .launch(RelayerRole::VIbc, runtime.relayers.get(RelayerRole::VIbc))
        .await?;

    let paths = direct_paths(pairs);
    let names: Vec<PathName> = paths.iter().map(|(name, _)| name.clone()).collect();

    relayer
        .init(chain_configs(runtime, pairs, config)?, paths)
        .await?;
    relayer.connect(&names).await?;

    let identity = relayer.identity();
    info!(relayer = %identity.name, paths = pairs.len(), "vibc relayer ready");

    Ok(Some(identity))
}

/// Configures and starts the relayer carrying virtual-chain events to the hub.
pub async fn setup_eth_relayer(
    runtime: &DevnetRuntime,
    launcher: &dyn RelayerLauncher,
    pairs: &[ChainPair],
    config: &HandshakeConfig,
) -> Result<Option<RelayerIdentity>, HandshakeError> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let relayer = launcher
        .launch(RelayerRole::Eth2, runtime.relayers.get(RelayerRole::Eth2))
        .await?;

    relayer
        .init(chain_configs(runtime, pairs, config)?, direct_paths(pairs))
        .await?;
    relayer.start().await?;

    let identity = relayer.identity();
    info!(relayer = %identity.name, paths = pairs.len(), "eth relayer ready");

    Ok(Some(identity))
}

/// Has `relayer` connect `path` and waits for the connection it creates on each chain.
///
/// Connections existing before the call are ignored, so the identifiers returned are the new
/// ones, `src` side first.
pub async fn connect_native_path<S, D>(
    relayer: &dyn Relayer,
    path: &PathName,
    src: &S,
    dst: &D,
    prefixes: &ClientPrefixes,
    poll: PollConfig,
) -> Result<(ConnectionId, ConnectionId), HandshakeError>
where
    S: ConnectionQuery + ?Sized,
    D: ConnectionQuery + ?Sized,
{
    let known_src = connection_ids(src, prefixes).await?;
    let known_dst = connection_ids(dst, prefixes).await?;

    relayer.connect(&[path.clone()]).await?;

    let mut poller = Poller::new(poll, format!("connection of path `{path}`"));
    let mut src_connection = None;
    let mut dst_connection = None;

    loop {
        if src_connection.is_none() {
            src_connection = new_connection(src, prefixes, &known_src).await?;
        }
        if dst_connection.is_none() {
            dst_connection = new_connection(dst, prefixes, &known_dst).await?;
        }

        if let (Some(a), Some(b)) = (&src_connection, &dst_connection) {
            info!(%path, src_connection = %a, dst_connection = %b, "path connected");
            return Ok((a.clone(), b.clone()));
        }

        poller.wait().await?;
    }
}

async fn connection_ids<C>(
    chain: &C,
    prefixes: &ClientPrefixes,
) -> Result<Vec<ConnectionId>, HandshakeError>
where
    C: ConnectionQuery + ?Sized,
{
    Ok(native_connections(chain, prefixes)
        .await?
        .into_iter()
        .map(|c| c.connection_id)
        .collect())
}

async fn new_connection<C>(
    chain: &C,
    prefixes: &ClientPrefixes,
    known: &[ConnectionId],
) -> Result<Option<ConnectionId>, HandshakeError>
where
    C: ConnectionQuery + ?Sized,
{
    Ok(connection_ids(chain, prefixes)
        .await?
        .into_iter()
        .find(|id| !known.contains(id)))
}
