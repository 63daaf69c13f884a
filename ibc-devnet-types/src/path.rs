//! Client and connection identifiers authenticating a channel across zero or one
//! intermediate chain.

use ibc_core_host_types::identifiers::{ClientId, ConnectionId};
use serde::{Deserialize, Serialize};

use crate::error::DevnetError;

/// The identity a chain presents on one side of a connection.
///
/// `chain_id` is also the key under which the chain's clients are looked up in the devnet.
/// `alias` lets the same physical chain appear under two roles in one [`Path`], which is how
/// the hub shows up in a two-hop path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEnd {
    chain_id: String,
    client_id: Option<ClientId>,
    connection_id: Option<ConnectionId>,
    alias: Option<String>,
}

impl PathEnd {
    /// A path end whose identifiers are not known yet.
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            client_id: None,
            connection_id: None,
            alias: None,
        }
    }

    pub fn with_client(self, client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            ..self
        }
    }

    pub fn with_connection(self, connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            ..self
        }
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.chain_id)
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn require_connection(&self) -> Result<&ConnectionId, DevnetError> {
        self.connection_id()
            .ok_or_else(|| DevnetError::IncompletePathEnd {
                name: self.name().to_string(),
                field: "connection id",
            })
    }

    pub fn require_client(&self) -> Result<&ClientId, DevnetError> {
        self.client_id()
            .ok_or_else(|| DevnetError::IncompletePathEnd {
                name: self.name().to_string(),
                field: "client id",
            })
    }
}

/// A direct path (`hop` empty) or a path through exactly one intermediate chain (`hop` holds
/// that chain's two connection-facing identities, `src`-facing first).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    src: PathEnd,
    dst: PathEnd,
    hop: Vec<PathEnd>,
}

impl Path {
    pub fn direct(src: PathEnd, dst: PathEnd) -> Self {
        Self {
            src,
            dst,
            hop: Vec::new(),
        }
    }

    pub fn through(src: PathEnd, hop: [PathEnd; 2], dst: PathEnd) -> Self {
        Self {
            src,
            dst,
            hop: hop.into(),
        }
    }

    pub fn src(&self) -> &PathEnd {
        &self.src
    }

    pub fn dst(&self) -> &PathEnd {
        &self.dst
    }

    pub fn hop(&self) -> &[PathEnd] {
        &self.hop
    }

    pub fn is_direct(&self) -> bool {
        self.hop.is_empty()
    }

    /// Name a relayer knows this path under.
    pub fn name(&self) -> String {
        format!("{}-{}", self.src.name(), self.dst.name())
    }

    /// The same path seen from `dst`.
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
            hop: self.hop.iter().rev().cloned().collect(),
        }
    }

    /// Connection hops of a channel opened on `src` along this path: `src`'s own connection,
    /// followed by the intermediate chain's connection facing `dst`.
    pub fn connection_hops(&self) -> Result<Vec<ConnectionId>, DevnetError> {
        let mut hops = vec![self.src.require_connection()?.clone()];

        if let Some(facing_dst) = self.hop.last() {
            hops.push(facing_dst.require_connection()?.clone());
        }

        Ok(hops)
    }
}
