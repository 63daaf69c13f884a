//! In-memory chains answering the queries and transactions of the handshake code.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ibc_core_channel_types::channel::{Order, State};
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId};
use ibc_devnet::chain::{
    ChainHandle, ChannelInfo, ConnectionInfo, ConnectionQuery, EventSource, NativeChain, TxOutcome,
};
use ibc_devnet::error::{ChainError, HandshakeError};
use ibc_devnet::handshake::{
    CHANNEL_OPEN_ACK, CHANNEL_OPEN_CONFIRM, CHANNEL_OPEN_INIT, CHANNEL_OPEN_TRY,
};
use ibc_devnet_types::event::{group_by_height, EventAttributes, EventsFilter, TxEvent};
use ibc_devnet_types::msgs::{
    join_connection_hops, MsgChannelOpenResponse, MsgConnectIbcChannel,
    MsgConnectIbcChannelResponse, MsgRegisterPort, CHAN_OPEN_ACK_RESPONSE_TYPE_URL,
    CHAN_OPEN_ACK_TYPE_URL, CHAN_OPEN_CONFIRM_RESPONSE_TYPE_URL, CHAN_OPEN_CONFIRM_TYPE_URL,
    CHAN_OPEN_INIT_RESPONSE_TYPE_URL, CHAN_OPEN_INIT_TYPE_URL, CHAN_OPEN_TRY_RESPONSE_TYPE_URL,
    CHAN_OPEN_TRY_TYPE_URL, CONNECT_IBC_CHANNEL_RESPONSE_TYPE_URL, CONNECT_IBC_CHANNEL_TYPE_URL,
    REGISTER_PORT_TYPE_URL,
};
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::core::channel::v1::{
    Channel as RawChannel, MsgChannelOpenAck, MsgChannelOpenConfirm, MsgChannelOpenInit,
    MsgChannelOpenTry,
};
use parking_lot::Mutex;
use prost::Message;
use tracing::debug;

/// Called with the port and channel of every channel end reaching the open state.
pub type OpenHook = Arc<dyn Fn(&PortId, &ChannelId) + Send + Sync>;

/// Blocks and the events recorded in them. Every recorded event gets a block of its own.
#[derive(Debug, Default)]
struct EventLog {
    height: u64,
    events: Vec<(u64, String, EventAttributes)>,
}

impl EventLog {
    fn mine(&mut self) -> u64 {
        self.height += 1;
        self.height
    }

    fn record(&mut self, name: &str, attributes: EventAttributes) -> u64 {
        let height = self.mine();
        self.events.push((height, name.to_string(), attributes));
        height
    }

    fn query(&self, filter: &EventsFilter) -> Vec<TxEvent> {
        group_by_height(
            self.events
                .iter()
                .filter(|(height, ..)| filter.contains(*height))
                .cloned(),
        )
    }
}

fn channel_attributes(
    port_id: &PortId,
    channel_id: &ChannelId,
    end: &ChannelInfo,
) -> EventAttributes {
    [
        ("port_id", port_id.to_string()),
        ("channel_id", channel_id.to_string()),
        ("counterparty_port_id", end.counterparty_port_id.to_string()),
        (
            "counterparty_channel_id",
            end.counterparty_channel_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        ),
        ("connection_id", join_connection_hops(&end.connection_hops)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

#[derive(Default)]
struct NativeState {
    log: EventLog,
    connections: Vec<ConnectionInfo>,
    channels: BTreeMap<(String, String), ChannelInfo>,
    next_channel: u64,
    registered_ports: Vec<(String, Vec<u8>)>,
    submitted: Vec<String>,
}

impl NativeState {
    fn next_client(&self, prefix: &str) -> Result<ClientId, HandshakeError> {
        let count = self
            .connections
            .iter()
            .filter(|c| c.client_id.as_str().starts_with(prefix))
            .count();

        Ok(format!("{prefix}-{count}").parse()?)
    }

    fn next_connection(&self) -> ConnectionId {
        ConnectionId::new(self.connections.len() as u64)
    }
}

/// A chain running the IBC core modules, with proof checks left out.
///
/// Each height query mines a block, so code waiting for blocks always makes progress.
pub struct MockChain {
    chain_id: String,
    signer: String,
    state: Mutex<NativeState>,
    open_hooks: Mutex<Vec<OpenHook>>,
}

impl MockChain {
    pub fn new(chain_id: impl Into<String>) -> Self {
        let chain_id = chain_id.into();

        Self {
            signer: format!("{chain_id}1devnetsigner"),
            chain_id,
            state: Mutex::new(NativeState::default()),
            open_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn height(&self) -> u64 {
        self.state.lock().log.height
    }

    /// Records `name` in a new block, returning its height.
    pub fn emit(&self, name: &str, attributes: EventAttributes) -> u64 {
        self.state.lock().log.record(name, attributes)
    }

    pub fn add_connection(&self, connection: ConnectionInfo) {
        self.state.lock().connections.push(connection);
    }

    /// Opens a client and a connection on both chains, each naming the other as counterparty.
    pub fn connect_to(
        &self,
        counterparty: &MockChain,
        client_prefix: &str,
    ) -> Result<(ConnectionId, ConnectionId), HandshakeError> {
        let (a_connection, a_client) = {
            let state = self.state.lock();
            (state.next_connection(), state.next_client(client_prefix)?)
        };
        let (b_connection, b_client) = {
            let state = counterparty.state.lock();
            (state.next_connection(), state.next_client(client_prefix)?)
        };

        self.add_connection(ConnectionInfo {
            connection_id: a_connection.clone(),
            client_id: a_client.clone(),
            counterparty_client_id: b_client.clone(),
            counterparty_connection_id: Some(b_connection.clone()),
        });
        counterparty.add_connection(ConnectionInfo {
            connection_id: b_connection.clone(),
            client_id: b_client,
            counterparty_client_id: a_client,
            counterparty_connection_id: Some(a_connection.clone()),
        });

        debug!(
            a = %self.chain_id,
            a_connection = %a_connection,
            b = %counterparty.chain_id,
            b_connection = %b_connection,
            "mock connection opened"
        );

        Ok((a_connection, b_connection))
    }

    pub fn channel(&self, port_id: &PortId, channel_id: &ChannelId) -> Option<ChannelInfo> {
        self.state
            .lock()
            .channels
            .get(&(port_id.to_string(), channel_id.to_string()))
            .cloned()
    }

    /// Type URLs of every message broadcast so far, in submission order.
    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().submitted.clone()
    }

    /// `(client_id, remote_sender_address)` of every registered port.
    pub fn registered_ports(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().registered_ports.clone()
    }

    pub fn on_channel_open(&self, hook: OpenHook) {
        self.open_hooks.lock().push(hook);
    }

    /// Opens a channel end the way a relayer-submitted open-init would.
    pub fn deliver_open_init(
        &self,
        port_id: PortId,
        ordering: Order,
        counterparty_port_id: PortId,
        connection_hops: Vec<ConnectionId>,
        version: Version,
    ) -> ChannelId {
        let end = ChannelInfo {
            state: State::Init,
            ordering,
            counterparty_port_id,
            counterparty_channel_id: None,
            connection_hops,
            version,
        };

        self.open_end(CHANNEL_OPEN_INIT, port_id, end)
    }

    /// Opens a channel end the way a relayer-submitted open-try would.
    pub fn deliver_open_try(
        &self,
        port_id: PortId,
        ordering: Order,
        counterparty_port_id: PortId,
        counterparty_channel_id: ChannelId,
        connection_hops: Vec<ConnectionId>,
        version: Version,
    ) -> ChannelId {
        let end = ChannelInfo {
            state: State::TryOpen,
            ordering,
            counterparty_port_id,
            counterparty_channel_id: Some(counterparty_channel_id),
            connection_hops,
            version,
        };

        self.open_end(CHANNEL_OPEN_TRY, port_id, end)
    }

    fn rejected(&self, log: impl ToString) -> ChainError {
        ChainError::BroadcastFailed {
            chain_id: self.chain_id.clone(),
            code: 1,
            log: log.to_string(),
        }
    }

    fn decode<M: Message + Default>(&self, msg: &Any) -> Result<M, ChainError> {
        M::decode(msg.value.as_slice()).map_err(|e| ChainError::Decode {
            chain_id: self.chain_id.clone(),
            what: "transaction message",
            reason: e.to_string(),
        })
    }

    fn channel_end(
        &self,
        state: State,
        raw: Option<RawChannel>,
    ) -> Result<ChannelInfo, HandshakeError> {
        let raw = raw.ok_or_else(|| self.rejected("channel end missing"))?;
        let counterparty = raw.counterparty.unwrap_or_default();
        let counterparty_channel_id = match counterparty.channel_id.as_str() {
            "" => None,
            id => Some(id.parse()?),
        };

        Ok(ChannelInfo {
            state,
            ordering: Order::from_i32(raw.ordering).map_err(|e| self.rejected(e))?,
            counterparty_port_id: counterparty.port_id.parse()?,
            counterparty_channel_id,
            connection_hops: raw
                .connection_hops
                .iter()
                .map(|hop| hop.parse::<ConnectionId>())
                .collect::<Result<_, _>>()?,
            version: Version::new(raw.version),
        })
    }

    fn open_end(&self, event: &str, port_id: PortId, end: ChannelInfo) -> ChannelId {
        let mut state = self.state.lock();
        let channel_id = ChannelId::new(state.next_channel);
        state.next_channel += 1;

        let attributes = channel_attributes(&port_id, &channel_id, &end);
        state
            .channels
            .insert((port_id.to_string(), channel_id.to_string()), end);
        let height = state.log.record(event, attributes);

        debug!(chain_id = %self.chain_id, %port_id, %channel_id, height, event, "mock channel end");

        channel_id
    }

    fn update_end<F>(
        &self,
        event: &str,
        port_id: &str,
        channel_id: &str,
        change: F,
    ) -> Result<(), HandshakeError>
    where
        F: FnOnce(&mut ChannelInfo),
    {
        let port_id: PortId = port_id.parse()?;
        let channel_id: ChannelId = channel_id.parse()?;

        let opened = {
            let mut state = self.state.lock();
            let key = (port_id.to_string(), channel_id.to_string());
            let end = state
                .channels
                .get_mut(&key)
                .ok_or_else(|| self.rejected(format!("channel {port_id}/{channel_id} not found")))?;

            change(end);
            let attributes = channel_attributes(&port_id, &channel_id, end);
            let opened = end.state.is_open();
            state.log.record(event, attributes);
            opened
        };

        if opened {
            let hooks = self.open_hooks.lock().clone();
            for hook in hooks {
                (*hook)(&port_id, &channel_id);
            }
        }

        Ok(())
    }

    fn execute(&self, msg: &Any) -> Result<Option<Any>, HandshakeError> {
        match msg.type_url.as_str() {
            CHAN_OPEN_INIT_TYPE_URL => {
                let msg: MsgChannelOpenInit = self.decode(msg)?;
                let end = self.channel_end(State::Init, msg.channel)?;
                let hops = join_connection_hops(&end.connection_hops);
                let channel_id = self.open_end(CHANNEL_OPEN_INIT, msg.port_id.parse()?, end);

                Ok(Some(open_response(
                    CHAN_OPEN_INIT_RESPONSE_TYPE_URL,
                    &channel_id,
                    hops,
                )))
            }
            CHAN_OPEN_TRY_TYPE_URL => {
                let msg: MsgChannelOpenTry = self.decode(msg)?;
                let end = self.channel_end(State::TryOpen, msg.channel)?;
                let hops = join_connection_hops(&end.connection_hops);
                let channel_id = self.open_end(CHANNEL_OPEN_TRY, msg.port_id.parse()?, end);

                Ok(Some(open_response(
                    CHAN_OPEN_TRY_RESPONSE_TYPE_URL,
                    &channel_id,
                    hops,
                )))
            }
            CHAN_OPEN_ACK_TYPE_URL => {
                let msg: MsgChannelOpenAck = self.decode(msg)?;
                let counterparty: ChannelId = msg.counterparty_channel_id.parse()?;
                self.update_end(CHANNEL_OPEN_ACK, &msg.port_id, &msg.channel_id, |end| {
                    end.state = State::Open;
                    end.counterparty_channel_id = Some(counterparty);
                })?;

                Ok(Some(empty_response(CHAN_OPEN_ACK_RESPONSE_TYPE_URL)))
            }
            CHAN_OPEN_CONFIRM_TYPE_URL => {
                let msg: MsgChannelOpenConfirm = self.decode(msg)?;
                self.update_end(CHANNEL_OPEN_CONFIRM, &msg.port_id, &msg.channel_id, |end| {
                    end.state = State::Open;
                })?;

                Ok(Some(empty_response(CHAN_OPEN_CONFIRM_RESPONSE_TYPE_URL)))
            }
            REGISTER_PORT_TYPE_URL => {
                let msg: MsgRegisterPort = self.decode(msg)?;
                let mut state = self.state.lock();
                let entry = (msg.client_id, msg.remote_sender_address);

                if state.registered_ports.contains(&entry) {
                    return Err(self.rejected("port already registered").into());
                }
                state.registered_ports.push(entry);

                Ok(None)
            }
            CONNECT_IBC_CHANNEL_TYPE_URL => {
                let msg: MsgConnectIbcChannel = self.decode(msg)?;
                let response = MsgConnectIbcChannelResponse {
                    channel_id: msg.channel_id,
                    port_id: msg.port_id,
                };

                Ok(Some(Any {
                    type_url: CONNECT_IBC_CHANNEL_RESPONSE_TYPE_URL.to_string(),
                    value: response.encode_to_vec(),
                }))
            }
            other => Err(self.rejected(format!("unknown message {other}")).into()),
        }
    }
}

fn open_response(type_url: &str, channel_id: &ChannelId, connection_id: String) -> Any {
    let response = MsgChannelOpenResponse {
        channel_id: channel_id.to_string(),
        connection_id,
    };

    Any {
        type_url: type_url.to_string(),
        value: response.encode_to_vec(),
    }
}

fn empty_response(type_url: &str) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: Vec::new(),
    }
}

impl ChainHandle for MockChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

#[async_trait]
impl EventSource for MockChain {
    async fn latest_height(&self) -> Result<u64, HandshakeError> {
        Ok(self.state.lock().log.mine())
    }

    async fn events(&self, filter: &EventsFilter) -> Result<Vec<TxEvent>, HandshakeError> {
        Ok(self.state.lock().log.query(filter))
    }
}

#[async_trait]
impl ConnectionQuery for MockChain {
    async fn connections(&self) -> Result<Vec<ConnectionInfo>, HandshakeError> {
        Ok(self.state.lock().connections.clone())
    }
}

#[async_trait]
impl NativeChain for MockChain {
    fn signer(&self) -> &str {
        &self.signer
    }

    async fn broadcast(&self, msgs: Vec<Any>) -> Result<TxOutcome, HandshakeError> {
        let mut msg_responses = Vec::new();

        for msg in &msgs {
            self.state.lock().submitted.push(msg.type_url.clone());
            msg_responses.extend(self.execute(msg)?);
        }

        Ok(TxOutcome {
            height: self.height(),
            msg_responses,
        })
    }

    async fn query_channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelInfo>, HandshakeError> {
        Ok(self.channel(port_id, channel_id))
    }
}

/// A chain without IBC support, seen through its dispatcher contract's events.
pub struct MockVirtualChain {
    chain_id: String,
    log: Mutex<EventLog>,
}

impl MockVirtualChain {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            log: Mutex::new(EventLog::default()),
        }
    }

    pub fn height(&self) -> u64 {
        self.log.lock().height
    }

    pub fn emit(&self, name: &str, attributes: EventAttributes) -> u64 {
        self.log.lock().record(name, attributes)
    }

    /// Every event emitted so far, grouped by height.
    pub fn events(&self) -> Vec<TxEvent> {
        self.log.lock().query(&EventsFilter::default())
    }
}

impl ChainHandle for MockVirtualChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

#[async_trait]
impl EventSource for MockVirtualChain {
    async fn latest_height(&self) -> Result<u64, HandshakeError> {
        Ok(self.log.lock().mine())
    }

    async fn events(&self, filter: &EventsFilter) -> Result<Vec<TxEvent>, HandshakeError> {
        Ok(self.log.lock().query(filter))
    }
}
