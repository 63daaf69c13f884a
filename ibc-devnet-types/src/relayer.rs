//! Identity and configuration of the relayer processes a devnet runs.

use std::collections::BTreeMap;

use derive_more::{Display as DisplayMore, From, Into};
use displaydoc::Display;
use ibc_core_host_types::identifiers::ConnectionId;
use serde::{Deserialize, Serialize};

use crate::chain::{ChainRecord, ChainType};
use crate::error::DevnetError;
use crate::path::Path;

/// The job a relayer process does in the devnet. At most one process runs per role.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RelayerRole {
    /// ibc-relayer
    Ibc,
    /// vibc-relayer
    VIbc,
    /// eth-relayer
    Eth2,
}

impl RelayerRole {
    pub const ALL: [RelayerRole; 3] = [Self::Ibc, Self::VIbc, Self::Eth2];
}

/// Key under which a relayer stores the configuration of one path.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
    DisplayMore,
)]
#[serde(transparent)]
pub struct PathName(String);

impl PathName {
    /// Path name of the ordered chain pair `src` -> `dst`.
    pub fn between(src: &str, dst: &str) -> Self {
        Self(format!("{src}-{dst}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PathName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// What a relayer needs to know about one chain it talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayerChainConfig {
    pub chain_id: String,
    pub chain_type: ChainType,
    pub rpc_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<String>,
}

impl RelayerChainConfig {
    /// Takes the first funded account and, on virtual chains, the dispatcher contract.
    pub fn from_record(record: &ChainRecord, dispatcher: &str) -> Result<Self, DevnetError> {
        Ok(Self {
            chain_id: record.name.clone(),
            chain_type: record.chain_type,
            rpc_host: record.rpc_host()?.to_string(),
            account: record.accounts.first().map(|a| a.address.clone()),
            dispatcher: record
                .contracts
                .iter()
                .find(|c| c.name == dispatcher)
                .map(|c| c.address.clone()),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PathConfig {
    pub path: Path,
    #[serde(default)]
    pub connection_hops: Vec<ConnectionId>,
}

impl PathConfig {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            connection_hops: Vec::new(),
        }
    }
}

/// The configuration a relayer process runs with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayerConfig {
    #[serde(default)]
    pub chains: BTreeMap<String, RelayerChainConfig>,
    #[serde(default)]
    pub paths: BTreeMap<PathName, PathConfig>,
}

/// A relayer process known to the devnet, reusable by later invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayerIdentity {
    pub name: String,
    pub role: RelayerRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub configuration: RelayerConfig,
}

impl RelayerIdentity {
    pub fn new(role: RelayerRole) -> Self {
        Self {
            name: role.to_string(),
            role,
            process_id: None,
            configuration: RelayerConfig::default(),
        }
    }
}

/// Running relayers, keyed by role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayerRegistry(BTreeMap<RelayerRole, RelayerIdentity>);

impl RelayerRegistry {
    pub fn get(&self, role: RelayerRole) -> Option<&RelayerIdentity> {
        self.0.get(&role)
    }

    /// Records `identity` under its role, returning the identity it replaces.
    pub fn insert(&mut self, identity: RelayerIdentity) -> Option<RelayerIdentity> {
        self.0.insert(identity.role, identity)
    }

    pub fn merge<I>(&mut self, identities: I)
    where
        I: IntoIterator<Item = RelayerIdentity>,
    {
        for identity in identities {
            self.insert(identity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayerIdentity> {
        self.0.values()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An ordered pair of chain names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainPair {
    pub src: String,
    pub dst: String,
}

impl ChainPair {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.dst.clone(), self.src.clone())
    }

    pub fn path_name(&self) -> PathName {
        PathName::between(&self.src, &self.dst)
    }
}

/// Requested chain pairs, partitioned by the relayer that serves them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayingPaths {
    /// hub -> virtual legs
    pub vibc: Vec<ChainPair>,
    /// native <-> native legs
    pub ibc: Vec<ChainPair>,
    /// virtual -> hub legs
    pub eth2: Vec<ChainPair>,
}

impl RelayingPaths {
    pub fn is_empty(&self) -> bool {
        self.vibc.is_empty() && self.ibc.is_empty() && self.eth2.is_empty()
    }
}
