use serde::{Deserialize, Serialize};

use crate::chain::ChainRecord;
use crate::error::DevnetError;
use crate::relayer::{RelayerIdentity, RelayerRegistry};

/// The state of a running devnet: its chains and the relayers serving them.
///
/// Handshake code reads this record and only ever extends it with relayer identities; the
/// devnet launcher owns everything else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DevnetRuntime {
    pub chain_sets: Vec<ChainRecord>,
    #[serde(default)]
    pub relayers: RelayerRegistry,
}

impl DevnetRuntime {
    pub fn chain(&self, chain_id: &str) -> Result<&ChainRecord, DevnetError> {
        self.chain_sets
            .iter()
            .find(|chain| chain.name == chain_id)
            .ok_or_else(|| DevnetError::UnknownChain {
                chain_id: chain_id.to_string(),
            })
    }

    /// The hub chain bridging virtual chains into IBC.
    pub fn hub(&self) -> Result<&ChainRecord, DevnetError> {
        self.chain_sets
            .iter()
            .find(|chain| chain.chain_type.is_hub())
            .ok_or(DevnetError::MissingHub)
    }

    /// Merges the identities produced by a relayer setup round.
    pub fn record_relayers<I>(&mut self, identities: I)
    where
        I: IntoIterator<Item = RelayerIdentity>,
    {
        self.relayers.merge(identities);
    }

    pub fn from_json(raw: &str) -> Result<Self, DevnetError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, DevnetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainType;
    use crate::relayer::RelayerRole;

    fn runtime() -> DevnetRuntime {
        DevnetRuntime::from_json(
            r#"{
                "ChainSets": [
                    { "Name": "polymer", "Type": "polymer", "Nodes": [{ "RpcHost": "http://localhost:26657" }] },
                    { "Name": "eth", "Type": "ethereum", "Nodes": [{ "RpcHost": "http://localhost:8545" }] }
                ]
            }"#,
        )
        .expect("valid runtime")
    }

    #[test]
    fn finds_chains_and_hub() {
        let runtime = runtime();

        assert_eq!(runtime.hub().expect("hub").name, "polymer");
        assert_eq!(
            runtime.chain("eth").expect("known").chain_type,
            ChainType::Ethereum
        );
        assert!(matches!(
            runtime.chain("osmosis"),
            Err(DevnetError::UnknownChain { chain_id }) if chain_id == "osmosis"
        ));
    }

    #[test]
    fn relayer_identities_survive_a_round_trip() {
        let mut runtime = runtime();
        runtime.record_relayers([RelayerIdentity::new(RelayerRole::VIbc)]);

        let back = DevnetRuntime::from_json(&runtime.to_json().expect("serializable"))
            .expect("deserializable");

        assert_eq!(back, runtime);
        assert!(back.relayers.get(RelayerRole::VIbc).is_some());
    }
}
