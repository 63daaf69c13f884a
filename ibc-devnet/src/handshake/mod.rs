//! Per-endpoint controllers of the four-message channel handshake.

mod msgs;
mod native;
mod virtual_link;

pub use msgs::{stub_proof, stub_proof_height, STUB_PROOF_HEIGHT};
pub use native::ChannelHandshaker;
pub use virtual_link::{virtual_port_id, VirtualChannelLink};

pub const CHANNEL_OPEN_INIT: &str = "channel_open_init";
pub const CHANNEL_OPEN_TRY: &str = "channel_open_try";
pub const CHANNEL_OPEN_ACK: &str = "channel_open_ack";
pub const CHANNEL_OPEN_CONFIRM: &str = "channel_open_confirm";

/// Event the dispatcher emits once a channel end on a virtual chain is open.
pub const CONNECT_IBC_CHANNEL: &str = "ConnectIbcChannel";
