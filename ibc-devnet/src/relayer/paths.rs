use ibc_devnet_types::chain::{ChainType, EndpointKind};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::relayer::{ChainPair, RelayingPaths};
use ibc_devnet_types::runtime::DevnetRuntime;

fn push_unique(bucket: &mut Vec<ChainPair>, pair: ChainPair) {
    if !bucket.contains(&pair) {
        bucket.push(pair);
    }
}

/// Sorts the requested chain pairs by the relayer that has to serve them.
///
/// Two native chains are served by the IBC relayer as requested. A hub/virtual pair, in either
/// order, needs both the vIBC relayer (hub to virtual) and the Ethereum relayer (virtual to hub).
/// Requests repeating an earlier pair are dropped; the first occurrence keeps its position.
pub fn configure_paths(
    runtime: &DevnetRuntime,
    connections: &[ChainPair],
) -> Result<RelayingPaths, DevnetError> {
    let mut paths = RelayingPaths::default();

    for pair in connections {
        let src = runtime.chain(&pair.src)?;
        let dst = runtime.chain(&pair.dst)?;

        match (src.chain_type, dst.chain_type) {
            (a, b)
                if a.endpoint_kind() == EndpointKind::Native
                    && b.endpoint_kind() == EndpointKind::Native =>
            {
                push_unique(&mut paths.ibc, pair.clone());
            }
            (ChainType::Polymer, ChainType::Ethereum) => {
                push_unique(&mut paths.vibc, pair.clone());
                push_unique(&mut paths.eth2, pair.reversed());
            }
            (ChainType::Ethereum, ChainType::Polymer) => {
                push_unique(&mut paths.vibc, pair.reversed());
                push_unique(&mut paths.eth2, pair.clone());
            }
            (src_type, dst_type) => {
                return Err(DevnetError::UnsupportedChainPair {
                    src_id: src.name.clone(),
                    src_type,
                    dst_id: dst.name.clone(),
                    dst_type,
                })
            }
        }
    }

    Ok(paths)
}
