//! Knobs of the handshake orchestration.
//!
//! Loading these from a file is up to the caller; every struct deserializes with defaults for
//! missing fields and can be assembled in code through its builder.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

pub const DEFAULT_POLL_RETRIES: u32 = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BLOCK_WAIT: u64 = 2;

/// Fixed attempt-count, fixed-delay polling. No jitter, no growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct PollConfig {
    #[builder(default = DEFAULT_POLL_RETRIES)]
    pub retries: u32,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub interval: Duration,
}

impl PollConfig {
    /// Upper bound on the time a wait loop runs before giving up.
    pub fn budget(&self) -> Duration {
        self.interval * self.retries
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Client identifier prefixes telling connections apart by the light client behind them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct ClientPrefixes {
    /// Client of a native chain, on any native chain.
    #[builder(default = "07-tendermint".to_string(), setter(into))]
    pub native: String,
    /// Client of the hub, kept on the hub on behalf of a virtual chain.
    #[builder(default = "polymer".to_string(), setter(into))]
    pub hub: String,
    /// Client of a virtual chain, on the hub.
    #[builder(default = "sim-test".to_string(), setter(into))]
    pub virtual_chain: String,
    /// Prefix of the ports the hub assigns to virtual-chain contracts.
    #[builder(default = "polyibc".to_string(), setter(into))]
    pub virtual_port: String,
}

impl Default for ClientPrefixes {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// How transactions are built and signed on native chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct TxConfig {
    #[builder(default = 2_000_000)]
    pub gas_limit: u64,
    #[builder(default = "stake".to_string(), setter(into))]
    pub fee_denom: String,
    #[builder(default = 5_000)]
    pub fee_amount: u64,
    #[builder(default, setter(into))]
    pub memo: String,
    #[builder(default = "m/44'/118'/0'/0/0".to_string(), setter(into))]
    pub hd_path: String,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything a handshake needs besides the devnet records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Funded account signing every native transaction.
    #[builder(default = "alice".to_string(), setter(into))]
    pub test_account: String,
    /// Name of the dispatcher contract in a virtual chain's contract list.
    #[builder(default = "Dispatcher".to_string(), setter(into))]
    pub dispatcher_contract: String,
    #[builder(default)]
    pub poll: PollConfig,
    /// Blocks to wait for before registering a port.
    #[builder(default = DEFAULT_BLOCK_WAIT)]
    pub block_wait: u64,
    #[builder(default)]
    pub prefixes: ClientPrefixes,
    #[builder(default)]
    pub tx: TxConfig,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// How to drive one relayer binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct RelayerDriverConfig {
    #[builder(setter(into))]
    pub binary: PathBuf,
    /// Directory the relayer keeps its configuration in.
    #[builder(setter(into))]
    pub home: PathBuf,
    #[serde(default)]
    #[builder(default)]
    pub extra_args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_devnet() {
        let config = HandshakeConfig::default();

        assert_eq!(config.poll.retries, 20);
        assert_eq!(config.poll.budget(), Duration::from_secs(200));
        assert_eq!(config.block_wait, 2);
        assert_eq!(config.prefixes.native, "07-tendermint");
        assert_eq!(config.tx.hd_path, "m/44'/118'/0'/0/0");
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: HandshakeConfig = serde_json::from_str(
            r#"{ "test_account": "relayer", "poll": { "retries": 3 } }"#,
        )
        .expect("valid config");

        assert_eq!(config.test_account, "relayer");
        assert_eq!(config.poll.retries, 3);
        assert_eq!(config.poll.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.dispatcher_contract, "Dispatcher");
    }
}
