//! Defines the error type raised while reading devnet records and building paths.

use displaydoc::Display;
use ibc_core_host_types::error::IdentifierError;

use crate::chain::ChainType;

#[derive(Debug, Display)]
pub enum DevnetError {
    /// unknown chain `{chain_id}`
    UnknownChain { chain_id: String },
    /// no hub chain is running in the devnet
    MissingHub,
    /// chain `{chain_id}` has no running node
    MissingNode { chain_id: String },
    /// account `{account}` not found on chain `{chain_id}`
    MissingAccount { chain_id: String, account: String },
    /// account `{account}` on chain `{chain_id}` has no mnemonic
    MissingMnemonic { chain_id: String, account: String },
    /// contract `{contract}` not deployed on chain `{chain_id}`
    MissingContract { chain_id: String, contract: String },
    /// unsupported chain pair: `{src_id}` (`{src_type}`) and `{dst_id}` (`{dst_type}`)
    UnsupportedChainPair {
        src_id: String,
        src_type: ChainType,
        dst_id: String,
        dst_type: ChainType,
    },
    /// path end `{name}` has no `{field}` yet
    IncompletePathEnd { name: String, field: &'static str },
    /// invalid identifier: `{0}`
    InvalidIdentifier(IdentifierError),
    /// invalid runtime record: `{0}`
    InvalidRecord(serde_json::Error),
}

impl From<IdentifierError> for DevnetError {
    fn from(err: IdentifierError) -> Self {
        Self::InvalidIdentifier(err)
    }
}

impl From<serde_json::Error> for DevnetError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRecord(err)
    }
}

impl std::error::Error for DevnetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::InvalidIdentifier(e) => Some(e),
            Self::InvalidRecord(e) => Some(e),
            _ => None,
        }
    }
}
