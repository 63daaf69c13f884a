//! Resolves the client and connection identifiers a channel needs from the connections the
//! chains already have.

use ibc_devnet_types::config::{ClientPrefixes, PollConfig};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::path::{Path, PathEnd};
use ibc_devnet_types::relayer::PathName;
use tracing::{debug, warn};

use crate::chain::{ConnectionInfo, ConnectionQuery};
use crate::error::HandshakeError;
use crate::poll::Poller;

/// A direct path between two native chains whose identifiers the relayer fills in itself.
pub fn ibc_path_from_chain_clients(src: &str, dst: &str) -> Path {
    Path::direct(PathEnd::new(src), PathEnd::new(dst))
}

fn has_prefix(id: &str, prefix: &str) -> bool {
    id.starts_with(prefix)
}

/// Connections of `chain` backed by a client of another native chain.
pub(crate) async fn native_connections<C>(
    chain: &C,
    prefixes: &ClientPrefixes,
) -> Result<Vec<ConnectionInfo>, HandshakeError>
where
    C: ConnectionQuery + ?Sized,
{
    Ok(chain
        .connections()
        .await?
        .into_iter()
        .filter(|c| has_prefix(c.client_id.as_str(), &prefixes.native))
        .collect())
}

fn path_end(chain_id: &str, connection: &ConnectionInfo) -> PathEnd {
    PathEnd::new(chain_id)
        .with_client(connection.client_id.clone())
        .with_connection(connection.connection_id.clone())
}

/// Waits until both chains have a native connection and builds a direct path out of the first
/// one found on each side.
pub async fn wait_for_path_connection<S, D>(
    src: &S,
    dst: &D,
    prefixes: &ClientPrefixes,
    poll: PollConfig,
) -> Result<Path, HandshakeError>
where
    S: ConnectionQuery + ?Sized,
    D: ConnectionQuery + ?Sized,
{
    let mut poller = Poller::new(
        poll,
        format!(
            "native connection between `{}` and `{}`",
            src.chain_id(),
            dst.chain_id()
        ),
    );

    loop {
        let src_conn = native_connections(src, prefixes).await?.into_iter().next();
        let dst_conn = native_connections(dst, prefixes).await?.into_iter().next();

        if let (Some(a), Some(b)) = (src_conn, dst_conn) {
            debug!(
                src = %src.chain_id(),
                src_connection = %a.connection_id,
                dst = %dst.chain_id(),
                dst_connection = %b.connection_id,
                "native path connected"
            );

            return Ok(Path::direct(
                path_end(src.chain_id(), &a),
                path_end(dst.chain_id(), &b),
            ));
        }

        poller.wait().await?;
    }
}

fn classify(slot: &mut Option<ConnectionInfo>, class: &'static str, connection: &ConnectionInfo) {
    if let Some(previous) = slot.replace(connection.clone()) {
        warn!(
            class,
            previous = %previous.connection_id,
            current = %connection.connection_id,
            "hub connection overwritten"
        );
    }
}

/// Whether `dst` is the counterparty of the hub connection `hub`. The hub side may not know its
/// counterparty yet.
fn faces(hub: &ConnectionInfo, dst: &ConnectionInfo) -> bool {
    dst.counterparty_connection_id.as_ref() == Some(&hub.connection_id)
        && hub
            .counterparty_connection_id
            .as_ref()
            .map_or(true, |id| *id == dst.connection_id)
}

/// Builds the two-hop path `virtual <-> hub <-> dst` from the connections the hub holds.
///
/// The hub keeps three kinds of connections for this path:
/// - a hub client whose counterparty is a virtual-chain client: the virtual chain's own end;
/// - a virtual-chain client whose counterparty is a hub client: the hub facing the virtual chain;
/// - a native client connected to `dst`: the hub facing `dst`.
///
/// Connections fitting none of these are skipped. When several fit one kind, the last one listed
/// wins.
pub async fn vibc_path_from_chain_clients<H, D>(
    hub: &H,
    virtual_chain: &str,
    dst: &D,
    prefixes: &ClientPrefixes,
) -> Result<Path, HandshakeError>
where
    H: ConnectionQuery + ?Sized,
    D: ConnectionQuery + ?Sized,
{
    let hub_connections = hub.connections().await?;
    let dst_connections = native_connections(dst, prefixes).await?;

    let mut virtual_end = None;
    let mut hub_virtual = None;
    let mut hub_dst = None;

    for connection in &hub_connections {
        let client = connection.client_id.as_str();
        let counterparty = connection.counterparty_client_id.as_str();

        if has_prefix(client, &prefixes.hub) && has_prefix(counterparty, &prefixes.virtual_chain) {
            classify(&mut virtual_end, "virtual end", connection);
        } else if has_prefix(client, &prefixes.virtual_chain)
            && has_prefix(counterparty, &prefixes.hub)
        {
            classify(&mut hub_virtual, "hub facing virtual", connection);
        } else if has_prefix(client, &prefixes.native)
            && dst_connections.iter().any(|d| faces(connection, d))
        {
            classify(&mut hub_dst, "hub facing destination", connection);
        } else {
            debug!(
                hub = %hub.chain_id(),
                connection_id = %connection.connection_id,
                "hub connection skipped"
            );
        }
    }

    let missing = |name: String| {
        HandshakeError::from(DevnetError::IncompletePathEnd {
            name,
            field: "connection id",
        })
    };

    let virtual_end = virtual_end.ok_or_else(|| missing(virtual_chain.to_string()))?;
    let hub_virtual_alias = PathName::between(hub.chain_id(), virtual_chain).to_string();
    let hub_virtual = hub_virtual.ok_or_else(|| missing(hub_virtual_alias.clone()))?;
    let hub_dst_alias = PathName::between(hub.chain_id(), dst.chain_id()).to_string();
    let hub_dst = hub_dst.ok_or_else(|| missing(hub_dst_alias.clone()))?;

    let dst_end = dst_connections
        .iter()
        .find(|d| faces(&hub_dst, d))
        .ok_or_else(|| missing(dst.chain_id().to_string()))?;

    Ok(Path::through(
        path_end(virtual_chain, &virtual_end),
        [
            path_end(hub.chain_id(), &hub_virtual).with_alias(hub_virtual_alias),
            path_end(hub.chain_id(), &hub_dst).with_alias(hub_dst_alias),
        ],
        path_end(dst.chain_id(), dst_end),
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use ibc_core_host_types::identifiers::ConnectionId;
    use parking_lot::Mutex;
    use rstest::*;

    use super::*;
    use crate::chain::ChainHandle;

    struct Connections {
        chain_id: String,
        connections: Mutex<Vec<ConnectionInfo>>,
    }

    impl Connections {
        fn new(chain_id: &str, connections: Vec<ConnectionInfo>) -> Self {
            Self {
                chain_id: chain_id.to_string(),
                connections: Mutex::new(connections),
            }
        }
    }

    impl ChainHandle for Connections {
        fn chain_id(&self) -> &str {
            &self.chain_id
        }
    }

    #[async_trait]
    impl ConnectionQuery for Connections {
        async fn connections(&self) -> Result<Vec<ConnectionInfo>, HandshakeError> {
            Ok(self.connections.lock().clone())
        }
    }

    fn conn(id: &str) -> ConnectionId {
        id.parse().expect("valid connection id")
    }

    fn info(
        id: &str,
        client: &str,
        counterparty: &str,
        counterparty_id: Option<&str>,
    ) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: conn(id),
            client_id: client.parse().expect("valid client id"),
            counterparty_client_id: counterparty.parse().expect("valid client id"),
            counterparty_connection_id: counterparty_id.map(conn),
        }
    }

    #[fixture]
    fn hub() -> Connections {
        Connections::new(
            "polymer",
            vec![
                info("connection-0", "polymer-0", "sim-test-0", Some("connection-1")),
                info("connection-1", "sim-test-0", "polymer-0", Some("connection-0")),
                info("connection-2", "07-tendermint-0", "07-tendermint-0", Some("connection-0")),
                info("connection-3", "07-tendermint-1", "07-tendermint-0", Some("connection-7")),
            ],
        )
    }

    #[fixture]
    fn wasm() -> Connections {
        Connections::new(
            "wasm",
            vec![info("connection-0", "07-tendermint-0", "07-tendermint-0", Some("connection-2"))],
        )
    }

    #[rstest]
    #[tokio::test]
    async fn vibc_path_goes_through_the_hub(hub: Connections, wasm: Connections) {
        let path = vibc_path_from_chain_clients(&hub, "eth", &wasm, &ClientPrefixes::default())
            .await
            .expect("complete path");

        assert_eq!(path.src().chain_id(), "eth");
        assert_eq!(path.src().connection_id(), Some(&conn("connection-0")));
        assert_eq!(path.hop()[0].name(), "polymer-eth");
        assert_eq!(path.hop()[0].connection_id(), Some(&conn("connection-1")));
        assert_eq!(path.hop()[1].name(), "polymer-wasm");
        assert_eq!(path.hop()[1].connection_id(), Some(&conn("connection-2")));
        assert_eq!(path.dst().connection_id(), Some(&conn("connection-0")));

        assert_eq!(
            path.connection_hops().expect("resolved"),
            vec![conn("connection-0"), conn("connection-2")]
        );
        assert_eq!(
            path.reverse().connection_hops().expect("resolved"),
            vec![conn("connection-0"), conn("connection-1")]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn last_listed_connection_wins(hub: Connections, wasm: Connections) {
        hub.connections
            .lock()
            .push(info("connection-4", "polymer-1", "sim-test-1", Some("connection-5")));

        let path = vibc_path_from_chain_clients(&hub, "eth", &wasm, &ClientPrefixes::default())
            .await
            .expect("complete path");

        assert_eq!(path.src().connection_id(), Some(&conn("connection-4")));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_virtual_connections_are_reported(wasm: Connections) {
        let hub = Connections::new(
            "polymer",
            vec![info("connection-2", "07-tendermint-0", "07-tendermint-0", Some("connection-0"))],
        );

        let err = vibc_path_from_chain_clients(&hub, "eth", &wasm, &ClientPrefixes::default())
            .await
            .expect_err("no virtual connection");

        assert!(matches!(
            err,
            HandshakeError::Devnet(DevnetError::IncompletePathEnd { name, .. }) if name == "eth"
        ));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn native_connection_wait_times_out() {
        let a = Connections::new("wasm", vec![]);
        let b = Connections::new("osmosis", vec![]);
        let poll = PollConfig::builder()
            .retries(2)
            .interval(Duration::from_secs(1))
            .build();

        let err = wait_for_path_connection(&a, &b, &ClientPrefixes::default(), poll)
            .await
            .expect_err("never connected");

        assert!(matches!(
            err,
            HandshakeError::Timeout { target, attempts: 2 } if target.contains("wasm") && target.contains("osmosis")
        ));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn native_path_takes_the_first_native_connection(hub: Connections, wasm: Connections) {
        let prefixes = ClientPrefixes::default();
        let path = wait_for_path_connection(&wasm, &hub, &prefixes, PollConfig::default())
            .await
            .expect("already connected");

        assert!(path.is_direct());
        assert_eq!(path.src().connection_id(), Some(&conn("connection-0")));
        assert_eq!(path.dst().connection_id(), Some(&conn("connection-2")));
        assert_eq!(path.dst().client_id().map(|c| c.as_str()), Some("07-tendermint-0"));
    }
}
