//! Protobuf messages of the hub chain's virtual-IBC module, and the response shapes this
//! crate reads back from channel handshake transactions.
//!
//! Field names and tags mirror the hub's module definitions; changing either breaks
//! interoperability with the running chain.

use ibc_core_host_types::identifiers::ConnectionId;
use ibc_proto::ibc::core::client::v1::Height as RawHeight;

pub const REGISTER_PORT_TYPE_URL: &str = "/polyibc.core.MsgRegisterPort";
pub const CONNECT_IBC_CHANNEL_TYPE_URL: &str = "/polyibc.core.MsgConnectIBCChannel";
pub const CONNECT_IBC_CHANNEL_RESPONSE_TYPE_URL: &str =
    "/polyibc.core.MsgConnectIBCChannelResponse";

pub const CHAN_OPEN_INIT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenInit";
pub const CHAN_OPEN_TRY_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenTry";
pub const CHAN_OPEN_ACK_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenAck";
pub const CHAN_OPEN_CONFIRM_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenConfirm";

pub const CHAN_OPEN_INIT_RESPONSE_TYPE_URL: &str =
    "/ibc.core.channel.v1.MsgChannelOpenInitResponse";
pub const CHAN_OPEN_TRY_RESPONSE_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenTryResponse";
pub const CHAN_OPEN_ACK_RESPONSE_TYPE_URL: &str = "/ibc.core.channel.v1.MsgChannelOpenAckResponse";
pub const CHAN_OPEN_CONFIRM_RESPONSE_TYPE_URL: &str =
    "/ibc.core.channel.v1.MsgChannelOpenConfirmResponse";

pub const SECP256K1_PUB_KEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// Separator of the composite connection identifier a multi-hop channel reports.
pub const CONNECTION_HOPS_SEPARATOR: char = '.';

/// Binds a port of the hub to a virtual-chain contract reachable through `client_id`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgRegisterPort {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub client_id: String,
    #[prost(bytes = "vec", tag = "3")]
    pub remote_sender_address: Vec<u8>,
}

/// Proof object the virtual-IBC module accepts in place of a membership proof.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VirtualProof {
    #[prost(message, optional, tag = "1")]
    pub height: Option<RawHeight>,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub value: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub proof: Vec<Vec<u8>>,
}

/// Completes a channel between two virtual-chain ports bridged by the hub.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgConnectIbcChannel {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub client_id: String,
    #[prost(string, tag = "3")]
    pub port_id: String,
    #[prost(string, tag = "4")]
    pub channel_id: String,
    #[prost(string, tag = "5")]
    pub counterparty_port_id: String,
    #[prost(string, tag = "6")]
    pub counterparty_channel_id: String,
    #[prost(message, optional, tag = "7")]
    pub proof: Option<VirtualProof>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgConnectIbcChannelResponse {
    #[prost(string, tag = "1")]
    pub channel_id: String,
    #[prost(string, tag = "2")]
    pub port_id: String,
}

/// Response to a channel open-init or open-try on a multi-hop capable chain.
///
/// `connection_id` joins the channel's connection hops with [`CONNECTION_HOPS_SEPARATOR`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgChannelOpenResponse {
    #[prost(string, tag = "1")]
    pub channel_id: String,
    #[prost(string, tag = "2")]
    pub connection_id: String,
}

/// Compressed secp256k1 public key of a transaction signer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

/// Splits a composite connection identifier into its hops, dropping empty segments.
pub fn split_connection_hops(composite: &str) -> impl Iterator<Item = &str> {
    composite
        .split(CONNECTION_HOPS_SEPARATOR)
        .filter(|hop| !hop.is_empty())
}

/// Joins hops into the composite connection identifier a multi-hop channel reports.
pub fn join_connection_hops(hops: &[ConnectionId]) -> String {
    hops.iter()
        .map(ConnectionId::as_str)
        .collect::<Vec<_>>()
        .join(&CONNECTION_HOPS_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn composite_connection_ids_split_on_dots() {
        let hops: Vec<_> = split_connection_hops("connection-0.connection-3").collect();
        assert_eq!(hops, ["connection-0", "connection-3"]);
        assert_eq!(split_connection_hops("").count(), 0);
    }

    #[test]
    fn joined_hops_split_back_into_the_same_identifiers() {
        let hops = [ConnectionId::new(0), ConnectionId::new(3)];

        let composite = join_connection_hops(&hops);

        assert_eq!(composite, "connection-0.connection-3");
        assert_eq!(join_connection_hops(&[]), "");
    }

    #[test]
    fn open_response_decodes_from_wire_bytes() {
        let response = MsgChannelOpenResponse {
            channel_id: "channel-4".to_string(),
            connection_id: "connection-1.connection-2".to_string(),
        };

        let decoded = MsgChannelOpenResponse::decode(response.encode_to_vec().as_slice())
            .expect("decodes");
        assert_eq!(decoded, response);
    }
}
