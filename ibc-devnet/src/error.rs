//! Defines the error types raised while driving handshakes and relayers.

use std::path::PathBuf;

use displaydoc::Display;
use ibc_core_host_types::error::IdentifierError;
use ibc_core_host_types::identifiers::ChannelId;
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::relayer::{PathName, RelayerRole};

use crate::flow::HandshakeFlow;

/// Failures reported by a chain backend.
#[derive(Debug, Display)]
pub enum ChainError {
    /// rpc request to chain `{chain_id}` failed: `{source}`
    Rpc {
        chain_id: String,
        source: tendermint_rpc::Error,
    },
    /// query `{path}` on chain `{chain_id}` failed: `{log}`
    QueryFailed {
        chain_id: String,
        path: &'static str,
        log: String,
    },
    /// transaction on chain `{chain_id}` failed with code `{code}`: `{log}`
    BroadcastFailed {
        chain_id: String,
        code: u32,
        log: String,
    },
    /// evm request to chain `{chain_id}` failed: `{reason}`
    Evm { chain_id: String, reason: String },
    /// failed to decode `{what}` from chain `{chain_id}`: `{reason}`
    Decode {
        chain_id: String,
        what: &'static str,
        reason: String,
    },
    /// transaction on chain `{chain_id}` carries no `{type_url}` response
    MissingResponse {
        chain_id: String,
        type_url: &'static str,
    },
    /// signing key of chain `{chain_id}` is unusable: `{reason}`
    Key { chain_id: String, reason: String },
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Rpc { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures of a relayer process or its configuration.
#[derive(Debug, Display)]
pub enum RelayerError {
    /// failed to run relayer `{relayer}`: `{source}`
    Spawn {
        relayer: String,
        source: std::io::Error,
    },
    /// relayer `{relayer}` command `{command}` exited with `{code:?}`: `{stderr}`
    CommandFailed {
        relayer: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    /// failed to access configuration `{file:?}` of relayer `{relayer}`: `{source}`
    ConfigIo {
        relayer: String,
        file: PathBuf,
        source: std::io::Error,
    },
    /// invalid configuration of relayer `{relayer}`: `{source}`
    InvalidConfig {
        relayer: String,
        source: serde_json::Error,
    },
    /// relayer `{relayer}` has no path `{path}`
    UnknownPath { relayer: String, path: PathName },
    /// no driver configured for the `{role}`
    MissingDriver { role: RelayerRole },
}

impl std::error::Error for RelayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Spawn { source, .. } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::InvalidConfig { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Top-level error of the handshake orchestration.
#[derive(Debug, Display)]
pub enum HandshakeError {
    /// devnet error: `{0}`
    Devnet(DevnetError),
    /// chain error: `{0}`
    Chain(ChainError),
    /// relayer error: `{0}`
    Relayer(RelayerError),
    /// timed out after `{attempts}` attempts waiting for `{target}`
    Timeout { target: String, attempts: u32 },
    /// event `{event}` on chain `{chain_id}` has no `{attribute}` attribute
    MissingAttribute {
        chain_id: String,
        event: String,
        attribute: &'static str,
    },
    /// channel on chain `{chain_id}` has no identifier yet
    ChannelNotOpened { chain_id: String },
    /// channel on chain `{chain_id}` is already `{assigned}`, refusing `{proposed}`
    ChannelAlreadyAssigned {
        chain_id: String,
        assigned: ChannelId,
        proposed: ChannelId,
    },
    /// `{flow}` channel handshakes are not implemented
    UnsupportedFlow { flow: HandshakeFlow },
    /// no `{role}` is running in the devnet
    MissingRelayer { role: RelayerRole },
    /// invalid identifier: `{0}`
    InvalidIdentifier(IdentifierError),
    /// failed to persist the devnet runtime to `{file:?}`: `{source}`
    Persist {
        file: PathBuf,
        source: std::io::Error,
    },
}

impl From<DevnetError> for HandshakeError {
    fn from(err: DevnetError) -> Self {
        Self::Devnet(err)
    }
}

impl From<ChainError> for HandshakeError {
    fn from(err: ChainError) -> Self {
        Self::Chain(err)
    }
}

impl From<RelayerError> for HandshakeError {
    fn from(err: RelayerError) -> Self {
        Self::Relayer(err)
    }
}

impl From<IdentifierError> for HandshakeError {
    fn from(err: IdentifierError) -> Self {
        Self::InvalidIdentifier(err)
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Devnet(e) => Some(e),
            Self::Chain(e) => Some(e),
            Self::Relayer(e) => Some(e),
            Self::InvalidIdentifier(e) => Some(e),
            Self::Persist { source, .. } => Some(source),
            _ => None,
        }
    }
}
