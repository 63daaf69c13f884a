use ibc_core_channel_types::channel::Order;
use ibc_core_channel_types::Version;
use serde::{Deserialize, Serialize};

/// One side of a channel that does not exist yet.
///
/// On a native chain `port_or_address` is the port identifier (e.g. `wasm.<contract>`); on a
/// virtual chain it is the address of the application contract bound to the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub chain: String,
    pub port_or_address: String,
    pub version: Version,
}

impl Endpoint {
    pub fn new(chain: impl Into<String>, port_or_address: impl Into<String>, version: &str) -> Self {
        Self {
            chain: chain.into(),
            port_or_address: port_or_address.into(),
            version: Version::new(version.to_string()),
        }
    }
}

/// A request to establish one channel between two endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub a: Endpoint,
    pub b: Endpoint,
    pub ordering: Order,
    /// Register the virtual endpoint's port on the hub before opening the channel.
    #[serde(default)]
    pub register_port: bool,
}

impl ChannelRequest {
    pub fn unordered(a: Endpoint, b: Endpoint) -> Self {
        Self {
            a,
            b,
            ordering: Order::Unordered,
            register_port: false,
        }
    }
}

/// The port and channel identifiers a finished handshake left on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    pub chain: String,
    pub port_id: String,
    pub channel_id: String,
}

/// Both ends of an established channel, in the order of the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub a: ChannelEndpoint,
    pub b: ChannelEndpoint,
}
