use std::sync::Arc;

use ibc_core_channel_types::channel::Order;
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId};
use ibc_devnet_types::config::{HandshakeConfig, PollConfig};
use ibc_devnet_types::event::EventAttributes;
use ibc_devnet_types::msgs::{
    split_connection_hops, MsgChannelOpenResponse, MsgConnectIbcChannelResponse,
    CHAN_OPEN_ACK_RESPONSE_TYPE_URL, CHAN_OPEN_CONFIRM_RESPONSE_TYPE_URL,
    CHAN_OPEN_INIT_RESPONSE_TYPE_URL, CHAN_OPEN_TRY_RESPONSE_TYPE_URL,
    CONNECT_IBC_CHANNEL_RESPONSE_TYPE_URL,
};
use ibc_proto::google::protobuf::Any;
use tracing::{debug, info};

use crate::chain::{NativeChain, TxOutcome};
use crate::error::{ChainError, HandshakeError};
use crate::event::EventWatcher;
use crate::handshake::msgs;
use crate::poll::Poller;

/// Drives one end of a channel on a chain running the IBC core modules.
///
/// The channel identifier is assigned once, either by this end's own open-init or open-try or by
/// observing the counterparty's event about it, and never changes afterwards. Handshakers live
/// for one handshake only; the chain is the only place the channel is remembered.
pub struct ChannelHandshaker {
    chain: Arc<dyn NativeChain>,
    port_id: PortId,
    version: Version,
    ordering: Order,
    channel_id: Option<ChannelId>,
    connection_hops: Vec<ConnectionId>,
    events: EventWatcher<dyn NativeChain>,
    block_wait: u64,
    poll: PollConfig,
}

impl ChannelHandshaker {
    /// Starts watching the chain at its current height.
    pub async fn new(
        chain: Arc<dyn NativeChain>,
        port_id: PortId,
        version: Version,
        ordering: Order,
        config: &HandshakeConfig,
    ) -> Result<Self, HandshakeError> {
        let events = EventWatcher::new(chain.clone(), config.poll).await?;

        debug!(
            chain_id = %chain.chain_id(),
            %port_id,
            min_height = events.min_height(),
            "channel handshaker ready"
        );

        Ok(Self {
            chain,
            port_id,
            version,
            ordering,
            channel_id: None,
            connection_hops: Vec::new(),
            events,
            block_wait: config.block_wait,
            poll: config.poll,
        })
    }

    pub fn chain(&self) -> &Arc<dyn NativeChain> {
        &self.chain
    }

    pub fn chain_id(&self) -> &str {
        self.chain.chain_id()
    }

    pub fn port_id(&self) -> &PortId {
        &self.port_id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn ordering(&self) -> Order {
        self.ordering
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    pub fn connection_hops(&self) -> &[ConnectionId] {
        &self.connection_hops
    }

    pub fn min_height(&self) -> u64 {
        self.events.min_height()
    }

    pub fn require_channel(&self) -> Result<&ChannelId, HandshakeError> {
        self.channel_id
            .as_ref()
            .ok_or_else(|| HandshakeError::ChannelNotOpened {
                chain_id: self.chain_id().to_string(),
            })
    }

    /// Records the channel identifier; assigning the same identifier again is a no-op.
    pub fn assign_channel(&mut self, channel_id: ChannelId) -> Result<(), HandshakeError> {
        match &self.channel_id {
            Some(assigned) if *assigned != channel_id => {
                Err(HandshakeError::ChannelAlreadyAssigned {
                    chain_id: self.chain_id().to_string(),
                    assigned: assigned.clone(),
                    proposed: channel_id,
                })
            }
            Some(_) => Ok(()),
            None => {
                debug!(chain_id = %self.chain_id(), %channel_id, "channel assigned");
                self.channel_id = Some(channel_id);
                Ok(())
            }
        }
    }

    /// Records connection hops reported as one composite identifier.
    pub fn assign_connection_hops(&mut self, composite: &str) -> Result<(), HandshakeError> {
        let hops = split_connection_hops(composite)
            .map(str::parse::<ConnectionId>)
            .collect::<Result<Vec<_>, _>>()?;

        if !hops.is_empty() {
            self.connection_hops = hops;
        }

        Ok(())
    }

    /// Adopts the channel an observed event is about, unless one is assigned already.
    pub fn adopt_channel(
        &mut self,
        event: &str,
        attributes: &EventAttributes,
    ) -> Result<ChannelId, HandshakeError> {
        if let Some(channel_id) = &self.channel_id {
            return Ok(channel_id.clone());
        }

        let channel_id: ChannelId = attribute(self.chain_id(), event, attributes, "channel_id")?
            .parse()?;
        self.assign_channel(channel_id.clone())?;

        if let Some(hops) = attributes.get("connection_id") {
            self.assign_connection_hops(hops)?;
        }

        Ok(channel_id)
    }

    pub async fn wait_for_event(&mut self, name: &str) -> Result<EventAttributes, HandshakeError> {
        self.events.wait_for_event(name).await
    }

    /// Waits until the chain produced `blocks` more blocks.
    pub async fn wait_for_blocks(&self, blocks: u64) -> Result<(), HandshakeError> {
        let target = self.chain.latest_height().await?.saturating_add(blocks);
        let mut poller = Poller::new(
            self.poll,
            format!("height {target} on chain `{}`", self.chain_id()),
        );

        while self.chain.latest_height().await? < target {
            poller.wait().await?;
        }

        Ok(())
    }

    async fn broadcast(&self, msg: Any) -> Result<TxOutcome, HandshakeError> {
        self.chain.broadcast(vec![msg]).await
    }

    /// Binds a hub port to the virtual-chain contract at `remote_sender_address` (hex).
    ///
    /// Registering the same pair twice is rejected by the hub.
    pub async fn register_port(
        &self,
        client_id: &ClientId,
        remote_sender_address: &str,
    ) -> Result<(), HandshakeError> {
        let address = hex::decode(remote_sender_address.trim_start_matches("0x")).map_err(|e| {
            ChainError::Decode {
                chain_id: self.chain_id().to_string(),
                what: "remote sender address",
                reason: e.to_string(),
            }
        })?;

        self.wait_for_blocks(self.block_wait).await?;

        let msg = msgs::register_port(self.chain.signer(), client_id, address);
        let outcome = self.broadcast(msg).await?;

        info!(
            chain_id = %self.chain_id(),
            %client_id,
            remote_sender_address,
            height = outcome.height,
            "port registered"
        );

        Ok(())
    }

    pub async fn chan_open_init(
        &mut self,
        counter: &ChannelHandshaker,
        connection_hops: Vec<ConnectionId>,
    ) -> Result<ChannelId, HandshakeError> {
        let msg = msgs::chan_open_init(
            &self.port_id,
            self.ordering,
            counter.port_id(),
            &connection_hops,
            &self.version,
            self.chain.signer(),
        );
        let outcome = self.broadcast(msg).await?;

        let response: MsgChannelOpenResponse =
            msgs::decode_response(self.chain_id(), &outcome, CHAN_OPEN_INIT_RESPONSE_TYPE_URL)?;

        self.connection_hops = connection_hops;
        self.assign_connection_hops(&response.connection_id)?;
        let channel_id: ChannelId = response.channel_id.parse()?;
        self.assign_channel(channel_id.clone())?;

        info!(chain_id = %self.chain_id(), %channel_id, height = outcome.height, "channel open init");

        Ok(channel_id)
    }

    /// Answers the counterparty's open-init, once `event` about it shows up on its chain.
    pub async fn chan_open_try(
        &mut self,
        counter: &mut ChannelHandshaker,
        connection_hops: Vec<ConnectionId>,
        event: &str,
    ) -> Result<ChannelId, HandshakeError> {
        let attributes = counter.wait_for_event(event).await?;
        let counter_channel = counter.adopt_channel(event, &attributes)?;

        let msg = msgs::chan_open_try(
            &self.port_id,
            self.ordering,
            counter.port_id(),
            &counter_channel,
            &connection_hops,
            &self.version,
            counter.version(),
            self.chain.signer(),
        );
        let outcome = self.broadcast(msg).await?;

        let response: MsgChannelOpenResponse =
            msgs::decode_response(self.chain_id(), &outcome, CHAN_OPEN_TRY_RESPONSE_TYPE_URL)?;

        self.connection_hops = connection_hops;
        let channel_id: ChannelId = response.channel_id.parse()?;
        self.assign_channel(channel_id.clone())?;

        info!(
            chain_id = %self.chain_id(),
            %channel_id,
            %counter_channel,
            height = outcome.height,
            "channel open try"
        );

        Ok(channel_id)
    }

    /// Acknowledges the counterparty's open-try, once `event` about it shows up on its chain.
    pub async fn chan_open_ack(
        &mut self,
        counter: &mut ChannelHandshaker,
        event: &str,
    ) -> Result<(), HandshakeError> {
        let channel_id = self.require_channel()?.clone();
        let attributes = counter.wait_for_event(event).await?;
        let counter_channel = counter.adopt_channel(event, &attributes)?;

        let msg = msgs::chan_open_ack(
            &self.port_id,
            &channel_id,
            &counter_channel,
            counter.version(),
            self.chain.signer(),
        );
        let outcome = self.broadcast(msg).await?;
        require_response(self.chain_id(), &outcome, CHAN_OPEN_ACK_RESPONSE_TYPE_URL)?;

        info!(chain_id = %self.chain_id(), %channel_id, height = outcome.height, "channel open ack");

        Ok(())
    }

    /// Confirms the channel once `event` shows up on this end's own chain.
    pub async fn chan_open_confirm(&mut self, event: &str) -> Result<(), HandshakeError> {
        let channel_id = self.require_channel()?.clone();
        self.wait_for_event(event).await?;

        let msg = msgs::chan_open_confirm(&self.port_id, &channel_id, self.chain.signer());
        let outcome = self.broadcast(msg).await?;
        require_response(self.chain_id(), &outcome, CHAN_OPEN_CONFIRM_RESPONSE_TYPE_URL)?;

        info!(chain_id = %self.chain_id(), %channel_id, height = outcome.height, "channel open confirm");

        Ok(())
    }

    /// Completes a channel between two ports the hub holds on behalf of virtual chains.
    pub async fn connect_ibc_channel(
        &mut self,
        client_id: &ClientId,
        counter: &ChannelHandshaker,
    ) -> Result<ChannelId, HandshakeError> {
        let channel_id = self.require_channel()?.clone();
        let counter_channel = counter.require_channel()?;

        let msg = msgs::connect_ibc_channel(
            self.chain.signer(),
            client_id,
            &self.port_id,
            &channel_id,
            counter.port_id(),
            counter_channel,
        );
        let outcome = self.broadcast(msg).await?;

        let response: MsgConnectIbcChannelResponse = msgs::decode_response(
            self.chain_id(),
            &outcome,
            CONNECT_IBC_CHANNEL_RESPONSE_TYPE_URL,
        )?;
        let connected: ChannelId = response.channel_id.parse()?;
        self.assign_channel(connected.clone())?;

        info!(chain_id = %self.chain_id(), channel_id = %connected, "virtual channel connected");

        Ok(connected)
    }
}

fn require_response(
    chain_id: &str,
    outcome: &TxOutcome,
    type_url: &'static str,
) -> Result<(), ChainError> {
    outcome
        .response(type_url)
        .map(|_| ())
        .ok_or_else(|| ChainError::MissingResponse {
            chain_id: chain_id.to_string(),
            type_url,
        })
}

pub(crate) fn attribute<'a>(
    chain_id: &str,
    event: &str,
    attributes: &'a EventAttributes,
    key: &'static str,
) -> Result<&'a str, HandshakeError> {
    attributes
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HandshakeError::MissingAttribute {
            chain_id: chain_id.to_string(),
            event: event.to_string(),
            attribute: key,
        })
}
