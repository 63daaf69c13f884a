//! Records describing the chains of a running devnet, as written by the devnet launcher.

use displaydoc::Display;
use serde::{Deserialize, Serialize};

use crate::error::DevnetError;

/// The kind of node software a devnet chain runs.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// cosmos
    Cosmos,
    /// polymer
    Polymer,
    /// ethereum
    Ethereum,
}

impl ChainType {
    /// Whether the chain runs the IBC core modules itself.
    pub fn endpoint_kind(&self) -> EndpointKind {
        match self {
            Self::Cosmos | Self::Polymer => EndpointKind::Native,
            Self::Ethereum => EndpointKind::Virtual,
        }
    }

    pub fn is_hub(&self) -> bool {
        matches!(self, Self::Polymer)
    }
}

/// Classifies one side of a channel handshake.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// native
    Native,
    /// virtual
    Virtual,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeRecord {
    #[serde(default)]
    pub label: String,
    pub rpc_host: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRecord {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractRecord {
    pub name: String,
    pub address: String,
}

/// A chain of the running devnet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChainRecord {
    pub name: String,
    #[serde(rename = "Type")]
    pub chain_type: ChainType,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    #[serde(default)]
    pub contracts: Vec<ContractRecord>,
}

impl ChainRecord {
    /// RPC endpoint of the first node, which every client of this crate talks to.
    pub fn rpc_host(&self) -> Result<&str, DevnetError> {
        self.nodes
            .first()
            .map(|node| node.rpc_host.as_str())
            .ok_or_else(|| DevnetError::MissingNode {
                chain_id: self.name.clone(),
            })
    }

    pub fn account(&self, name: &str) -> Result<&AccountRecord, DevnetError> {
        self.accounts
            .iter()
            .find(|account| account.name == name)
            .ok_or_else(|| DevnetError::MissingAccount {
                chain_id: self.name.clone(),
                account: name.to_string(),
            })
    }

    pub fn contract(&self, name: &str) -> Result<&ContractRecord, DevnetError> {
        self.contracts
            .iter()
            .find(|contract| contract.name == name)
            .ok_or_else(|| DevnetError::MissingContract {
                chain_id: self.name.clone(),
                contract: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_record_uses_launcher_field_names() {
        let raw = r#"{
            "Name": "eth",
            "Type": "ethereum",
            "Nodes": [{ "Label": "geth", "RpcHost": "http://localhost:8545" }],
            "Contracts": [{ "Name": "Dispatcher", "Address": "0x5FbDB2315678afecb367f032d93F642f64180aa3" }]
        }"#;

        let record: ChainRecord = serde_json::from_str(raw).expect("valid record");

        assert_eq!(record.chain_type, ChainType::Ethereum);
        assert_eq!(record.rpc_host().expect("has node"), "http://localhost:8545");
        assert!(record.accounts.is_empty());
        assert_eq!(
            record.contract("Dispatcher").expect("deployed").address,
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
    }

    #[test]
    fn missing_resources_are_named() {
        let record = ChainRecord {
            name: "wasm".to_string(),
            chain_type: ChainType::Cosmos,
            nodes: vec![],
            accounts: vec![],
            contracts: vec![],
        };

        assert!(matches!(
            record.rpc_host(),
            Err(DevnetError::MissingNode { chain_id }) if chain_id == "wasm"
        ));
        assert!(matches!(
            record.account("alice"),
            Err(DevnetError::MissingAccount { account, .. }) if account == "alice"
        ));
    }

    #[test]
    fn only_ethereum_is_virtual() {
        assert_eq!(ChainType::Cosmos.endpoint_kind(), EndpointKind::Native);
        assert_eq!(ChainType::Polymer.endpoint_kind(), EndpointKind::Native);
        assert_eq!(ChainType::Ethereum.endpoint_kind(), EndpointKind::Virtual);
        assert_eq!(ChainType::Polymer.to_string(), "polymer");
    }
}
