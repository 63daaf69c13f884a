//! Builds the handshake messages and reads their responses back.
//!
//! The devnet's chains run with proof verification stubbed out, so every proof is a fixed
//! placeholder at a fixed height.

use ibc_core_channel_types::channel::Order;
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ClientId, ConnectionId, PortId};
use ibc_devnet_types::msgs::{
    MsgConnectIbcChannel, MsgRegisterPort, VirtualProof, CHAN_OPEN_ACK_TYPE_URL,
    CHAN_OPEN_CONFIRM_TYPE_URL, CHAN_OPEN_INIT_TYPE_URL, CHAN_OPEN_TRY_TYPE_URL,
    CONNECT_IBC_CHANNEL_TYPE_URL, REGISTER_PORT_TYPE_URL,
};
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::core::channel::v1::{
    Channel as RawChannel, Counterparty as RawCounterparty, MsgChannelOpenAck,
    MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry, State as RawState,
};
use ibc_proto::ibc::core::client::v1::Height as RawHeight;
use prost::Message;

use crate::chain::TxOutcome;
use crate::error::ChainError;

pub const STUB_PROOF_HEIGHT: u64 = 100;

pub fn stub_proof() -> Vec<u8> {
    vec![0; 8]
}

pub fn stub_proof_height() -> RawHeight {
    RawHeight {
        revision_number: 0,
        revision_height: STUB_PROOF_HEIGHT,
    }
}

fn to_any<M: Message>(type_url: &str, msg: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: msg.encode_to_vec(),
    }
}

fn channel_end(
    state: RawState,
    ordering: Order,
    counterparty_port_id: &PortId,
    counterparty_channel_id: Option<&ChannelId>,
    connection_hops: &[ConnectionId],
    version: &Version,
) -> RawChannel {
    RawChannel {
        state: state as i32,
        ordering: ordering as i32,
        counterparty: Some(RawCounterparty {
            port_id: counterparty_port_id.to_string(),
            channel_id: counterparty_channel_id
                .map(ToString::to_string)
                .unwrap_or_default(),
        }),
        connection_hops: connection_hops.iter().map(ToString::to_string).collect(),
        version: version.to_string(),
        ..Default::default()
    }
}

pub fn chan_open_init(
    port_id: &PortId,
    ordering: Order,
    counterparty_port_id: &PortId,
    connection_hops: &[ConnectionId],
    version: &Version,
    signer: &str,
) -> Any {
    let msg = MsgChannelOpenInit {
        port_id: port_id.to_string(),
        channel: Some(channel_end(
            RawState::Init,
            ordering,
            counterparty_port_id,
            None,
            connection_hops,
            version,
        )),
        signer: signer.to_string(),
    };

    to_any(CHAN_OPEN_INIT_TYPE_URL, &msg)
}

#[allow(clippy::too_many_arguments)]
pub fn chan_open_try(
    port_id: &PortId,
    ordering: Order,
    counterparty_port_id: &PortId,
    counterparty_channel_id: &ChannelId,
    connection_hops: &[ConnectionId],
    version: &Version,
    counterparty_version: &Version,
    signer: &str,
) -> Any {
    let msg = MsgChannelOpenTry {
        port_id: port_id.to_string(),
        channel: Some(channel_end(
            RawState::Tryopen,
            ordering,
            counterparty_port_id,
            Some(counterparty_channel_id),
            connection_hops,
            version,
        )),
        counterparty_version: counterparty_version.to_string(),
        proof_init: stub_proof(),
        proof_height: Some(stub_proof_height()),
        signer: signer.to_string(),
        ..Default::default()
    };

    to_any(CHAN_OPEN_TRY_TYPE_URL, &msg)
}

pub fn chan_open_ack(
    port_id: &PortId,
    channel_id: &ChannelId,
    counterparty_channel_id: &ChannelId,
    counterparty_version: &Version,
    signer: &str,
) -> Any {
    let msg = MsgChannelOpenAck {
        port_id: port_id.to_string(),
        channel_id: channel_id.to_string(),
        counterparty_channel_id: counterparty_channel_id.to_string(),
        counterparty_version: counterparty_version.to_string(),
        proof_try: stub_proof(),
        proof_height: Some(stub_proof_height()),
        signer: signer.to_string(),
    };

    to_any(CHAN_OPEN_ACK_TYPE_URL, &msg)
}

pub fn chan_open_confirm(port_id: &PortId, channel_id: &ChannelId, signer: &str) -> Any {
    let msg = MsgChannelOpenConfirm {
        port_id: port_id.to_string(),
        channel_id: channel_id.to_string(),
        proof_ack: stub_proof(),
        proof_height: Some(stub_proof_height()),
        signer: signer.to_string(),
    };

    to_any(CHAN_OPEN_CONFIRM_TYPE_URL, &msg)
}

pub fn register_port(creator: &str, client_id: &ClientId, remote_sender_address: Vec<u8>) -> Any {
    let msg = MsgRegisterPort {
        creator: creator.to_string(),
        client_id: client_id.to_string(),
        remote_sender_address,
    };

    to_any(REGISTER_PORT_TYPE_URL, &msg)
}

pub fn connect_ibc_channel(
    creator: &str,
    client_id: &ClientId,
    port_id: &PortId,
    channel_id: &ChannelId,
    counterparty_port_id: &PortId,
    counterparty_channel_id: &ChannelId,
) -> Any {
    let msg = MsgConnectIbcChannel {
        creator: creator.to_string(),
        client_id: client_id.to_string(),
        port_id: port_id.to_string(),
        channel_id: channel_id.to_string(),
        counterparty_port_id: counterparty_port_id.to_string(),
        counterparty_channel_id: counterparty_channel_id.to_string(),
        proof: Some(VirtualProof {
            height: Some(stub_proof_height()),
            key: b"key".to_vec(),
            value: b"value".to_vec(),
            proof: vec![stub_proof()],
        }),
    };

    to_any(CONNECT_IBC_CHANNEL_TYPE_URL, &msg)
}

/// Decodes the response of the message with `type_url` out of a committed transaction.
pub fn decode_response<M>(
    chain_id: &str,
    outcome: &TxOutcome,
    type_url: &'static str,
) -> Result<M, ChainError>
where
    M: Message + Default,
{
    let any = outcome
        .response(type_url)
        .ok_or_else(|| ChainError::MissingResponse {
            chain_id: chain_id.to_string(),
            type_url,
        })?;

    M::decode(any.value.as_slice()).map_err(|e| ChainError::Decode {
        chain_id: chain_id.to_string(),
        what: type_url,
        reason: e.to_string(),
    })
}
