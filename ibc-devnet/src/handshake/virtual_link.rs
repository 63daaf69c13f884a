use std::sync::Arc;

use ibc_core_channel_types::channel::Order;
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId};
use ibc_devnet_types::config::ClientPrefixes;
use ibc_devnet_types::event::EventAttributes;
use ibc_devnet_types::relayer::{PathName, RelayerIdentity};
use tracing::info;

use crate::chain::EventSource;
use crate::error::HandshakeError;
use crate::event::EventWatcher;
use crate::handshake::native::ChannelHandshaker;
use crate::handshake::{CHANNEL_OPEN_INIT, CHANNEL_OPEN_TRY, CONNECT_IBC_CHANNEL};
use crate::relayer::{ChannelOpenRequest, Relayer};

/// Port the hub assigns to the contract at `address` on the virtual chain behind `client_id`.
pub fn virtual_port_id(
    prefixes: &ClientPrefixes,
    client_id: &ClientId,
    address: &str,
) -> Result<PortId, HandshakeError> {
    let address = address.trim_start_matches("0x").to_lowercase();

    Ok(format!("{}.{client_id}.{address}", prefixes.virtual_port).parse()?)
}

fn same_address(a: &str, b: &str) -> bool {
    a.trim_start_matches("0x")
        .eq_ignore_ascii_case(b.trim_start_matches("0x"))
}

/// Both sides of a channel end that lives on a virtual chain.
///
/// Messages to the virtual chain go through the relayer serving the hub/virtual pair; their
/// effects are observed on the hub, whose end of the bridged channel is driven by `hub`.
pub struct VirtualChannelLink {
    chain_id: String,
    address: String,
    pathname: PathName,
    relayer: Arc<dyn Relayer>,
    hub: ChannelHandshaker,
    events: EventWatcher<dyn EventSource>,
}

impl VirtualChannelLink {
    pub fn new(
        hub: ChannelHandshaker,
        events: EventWatcher<dyn EventSource>,
        address: impl Into<String>,
        relayer: Arc<dyn Relayer>,
    ) -> Self {
        let chain_id = events.source().chain_id().to_string();
        let pathname = PathName::between(hub.chain_id(), &chain_id);

        Self {
            chain_id,
            address: address.into(),
            pathname,
            relayer,
            hub,
            events,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Key of the hub/virtual path in the relayer's configuration.
    pub fn pathname(&self) -> &PathName {
        &self.pathname
    }

    pub fn hub(&self) -> &ChannelHandshaker {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut ChannelHandshaker {
        &mut self.hub
    }

    /// The relayer as it stands now, to be recorded once the link is done with it.
    pub fn relayer_identity(&self) -> RelayerIdentity {
        self.relayer.identity()
    }

    /// Has the relayer open the channel on the virtual chain, then waits for the hub to report
    /// the matching channel end and records it onto the hub handshaker.
    ///
    /// The hub reports an open-init when the counterparty has no channel yet, an open-try
    /// otherwise.
    pub async fn open_ibc_channel(
        &mut self,
        counter: &ChannelHandshaker,
        connection_hops: Vec<ConnectionId>,
        version: Version,
        ordering: Order,
    ) -> Result<ChannelId, HandshakeError> {
        let request = ChannelOpenRequest {
            path: self.pathname.clone(),
            receiver: self.address.clone(),
            version,
            ordering,
            connection_hops,
            counterparty_port_id: counter.port_id().clone(),
            counterparty_channel_id: counter.channel_id().cloned(),
        };

        self.relayer.channel(&request).await?;

        let event = if request.counterparty_channel_id.is_some() {
            CHANNEL_OPEN_TRY
        } else {
            CHANNEL_OPEN_INIT
        };
        let attributes = self.hub.wait_for_event(event).await?;
        let channel_id = self.hub.adopt_channel(event, &attributes)?;

        info!(
            chain_id = %self.chain_id,
            hub = %self.hub.chain_id(),
            %channel_id,
            "virtual channel end opened"
        );

        Ok(channel_id)
    }

    /// Pushes the resolved hops into the relayer's configuration and starts relaying.
    pub async fn start_relaying(
        &self,
        connection_hops: &[ConnectionId],
    ) -> Result<(), HandshakeError> {
        self.relayer.update(&self.pathname, connection_hops).await?;
        self.relayer.start().await?;

        Ok(())
    }

    /// Waits for the virtual chain to report this link's channel end as connected.
    ///
    /// Only a connect event for the hub channel assigned so far and for this link's contract
    /// counts; events of other channels on the same dispatcher are skipped.
    pub async fn wait_for_connected(&mut self) -> Result<EventAttributes, HandshakeError> {
        let channel_id = self.hub.require_channel()?.to_string();
        let address = self.address.clone();

        self.events
            .wait_for_matching(CONNECT_IBC_CHANNEL, |attributes| {
                attributes.get("channelId") == Some(&channel_id)
                    && attributes
                        .get("portAddress")
                        .is_some_and(|port| same_address(port, &address))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_ports_embed_client_and_address() {
        let port = virtual_port_id(
            &ClientPrefixes::default(),
            &"sim-test-0".parse().expect("valid client id"),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        )
        .expect("valid port");

        assert_eq!(
            port.as_str(),
            "polyibc.sim-test-0.5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }

    #[test]
    fn addresses_compare_without_prefix_or_case() {
        assert!(same_address(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "5fbdb2315678afecb367f032d93f642f64180aa3"
        ));
        assert!(!same_address("0x5FbDB2315678afecb367f032d93F642f64180aa3", "0xe7f1"));
    }
}
