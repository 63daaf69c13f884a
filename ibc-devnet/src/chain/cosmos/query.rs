//! ABCI queries against the gRPC query services of a Cosmos SDK chain.

use ibc_core_channel_types::channel::{Order, State};
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ConnectionId, PortId};
use ibc_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use ibc_proto::cosmos::base::query::v1beta1::PageRequest;
use ibc_proto::ibc::core::channel::v1::{
    Channel as RawChannel, QueryChannelRequest, QueryChannelResponse,
};
use ibc_proto::ibc::core::connection::v1::{
    IdentifiedConnection, QueryConnectionsRequest, QueryConnectionsResponse,
};
use prost::Message;
use tendermint_rpc::{Client, HttpClient};

use crate::chain::{ChannelInfo, ConnectionInfo};
use crate::error::{ChainError, HandshakeError};

pub const ACCOUNT_QUERY_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";
pub const CONNECTIONS_QUERY_PATH: &str = "/ibc.core.connection.v1.Query/Connections";
pub const CHANNEL_QUERY_PATH: &str = "/ibc.core.channel.v1.Query/Channel";

/// Runs `request` against the query service at `path` at the latest height.
async fn abci_query<Req, Res>(
    rpc: &HttpClient,
    chain_id: &str,
    path: &'static str,
    request: &Req,
) -> Result<Res, ChainError>
where
    Req: Message,
    Res: Message + Default,
{
    let response = rpc
        .abci_query(Some(path.to_string()), request.encode_to_vec(), None, false)
        .await
        .map_err(|source| ChainError::Rpc {
            chain_id: chain_id.to_string(),
            source,
        })?;

    if response.code.is_err() {
        return Err(ChainError::QueryFailed {
            chain_id: chain_id.to_string(),
            path,
            log: response.log,
        });
    }

    Res::decode(response.value.as_slice()).map_err(|e| ChainError::Decode {
        chain_id: chain_id.to_string(),
        what: path,
        reason: e.to_string(),
    })
}

/// Account number and next sequence of `address`.
pub async fn query_account(
    rpc: &HttpClient,
    chain_id: &str,
    address: &str,
) -> Result<(u64, u64), ChainError> {
    let response: QueryAccountResponse = abci_query(
        rpc,
        chain_id,
        ACCOUNT_QUERY_PATH,
        &QueryAccountRequest {
            address: address.to_string(),
        },
    )
    .await?;

    let decode_error = |reason: String| ChainError::Decode {
        chain_id: chain_id.to_string(),
        what: "base account",
        reason,
    };

    let any = response
        .account
        .ok_or_else(|| decode_error(format!("no account for {address}")))?;
    let account =
        BaseAccount::decode(any.value.as_slice()).map_err(|e| decode_error(e.to_string()))?;

    Ok((account.account_number, account.sequence))
}

/// Every connection end of the chain, draining all result pages.
pub async fn query_connections(
    rpc: &HttpClient,
    chain_id: &str,
) -> Result<Vec<ConnectionInfo>, HandshakeError> {
    let mut connections = Vec::new();
    let mut next_key = Vec::new();

    loop {
        let response: QueryConnectionsResponse = abci_query(
            rpc,
            chain_id,
            CONNECTIONS_QUERY_PATH,
            &QueryConnectionsRequest {
                pagination: Some(PageRequest {
                    key: next_key,
                    ..Default::default()
                }),
            },
        )
        .await?;

        for raw in response.connections {
            connections.push(connection_info(raw)?);
        }

        match response.pagination {
            Some(page) if !page.next_key.is_empty() => next_key = page.next_key,
            _ => break,
        }
    }

    Ok(connections)
}

fn connection_info(raw: IdentifiedConnection) -> Result<ConnectionInfo, HandshakeError> {
    let counterparty = raw.counterparty.unwrap_or_default();
    let counterparty_connection_id = if counterparty.connection_id.is_empty() {
        None
    } else {
        Some(counterparty.connection_id.parse()?)
    };

    Ok(ConnectionInfo {
        connection_id: raw.id.parse()?,
        client_id: raw.client_id.parse()?,
        counterparty_client_id: counterparty.client_id.parse()?,
        counterparty_connection_id,
    })
}

pub async fn query_channel(
    rpc: &HttpClient,
    chain_id: &str,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result<Option<ChannelInfo>, HandshakeError> {
    let request = QueryChannelRequest {
        port_id: port_id.to_string(),
        channel_id: channel_id.to_string(),
    };

    let response = abci_query::<_, QueryChannelResponse>(rpc, chain_id, CHANNEL_QUERY_PATH, &request)
        .await;

    match response {
        Ok(response) => response
            .channel
            .map(|raw| channel_info(chain_id, raw))
            .transpose(),
        // the channel module answers an unknown channel with an error code
        Err(ChainError::QueryFailed { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Converts a raw channel end, failing on states and orderings this crate does not know.
pub fn channel_info(chain_id: &str, raw: RawChannel) -> Result<ChannelInfo, HandshakeError> {
    let decode_error = |reason: String| ChainError::Decode {
        chain_id: chain_id.to_string(),
        what: "channel end",
        reason,
    };

    let counterparty = raw.counterparty.unwrap_or_default();
    let counterparty_channel_id = if counterparty.channel_id.is_empty() {
        None
    } else {
        Some(counterparty.channel_id.parse()?)
    };

    Ok(ChannelInfo {
        state: State::from_i32(raw.state).map_err(|e| decode_error(e.to_string()))?,
        ordering: Order::from_i32(raw.ordering).map_err(|e| decode_error(e.to_string()))?,
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
