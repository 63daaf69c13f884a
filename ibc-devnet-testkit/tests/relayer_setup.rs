use ibc_core_host_types::identifiers::ConnectionId;
use ibc_devnet::error::HandshakeError;
use ibc_devnet::relayer::{connect_native_path, Relayer};
use ibc_devnet_testkit::fixtures::{DevnetFixture, ETH, HUB, OSMOSIS, WASM};
use ibc_devnet_testkit::relayer::{MockRelayer, RelayerCall};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::path::{Path, PathEnd};
use ibc_devnet_types::relayer::{ChainPair, PathConfig, PathName, RelayerRole, RelayingPaths};
use rstest::*;

#[fixture]
fn fixture() -> DevnetFixture {
    DevnetFixture::new()
}

fn init(chains: [&str; 2], path: &str) -> RelayerCall {
    RelayerCall::Init {
        chains: chains.iter().map(ToString::to_string).collect(),
        paths: vec![PathName::from(path)],
    }
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn every_relayer_is_set_up_and_saved_once(fixture: DevnetFixture) {
    let mut devnet = fixture.devnet();

    let paths = devnet
        .setup_relayers(&[ChainPair::new(WASM, OSMOSIS), ChainPair::new(ETH, HUB)])
        .await
        .expect("relayers set up");

    assert_eq!(
        paths,
        RelayingPaths {
            vibc: vec![ChainPair::new(HUB, ETH)],
            ibc: vec![ChainPair::new(WASM, OSMOSIS)],
            eth2: vec![ChainPair::new(ETH, HUB)],
        }
    );

    let ibc = fixture.launcher.relayer(RelayerRole::Ibc).expect("launched");
    assert_eq!(
        ibc.calls(),
        vec![
            init([WASM, OSMOSIS], "wasm-osmosis"),
            RelayerCall::Connect(vec![PathName::from("wasm-osmosis")]),
            RelayerCall::Update {
                path: PathName::from("wasm-osmosis"),
                connection_hops: vec![ConnectionId::new(1)],
            },
            RelayerCall::Start,
        ]
    );

    let vibc = fixture.launcher.relayer(RelayerRole::VIbc).expect("launched");
    assert_eq!(
        vibc.calls(),
        vec![
            init([HUB, ETH], "polymer-eth"),
            RelayerCall::Connect(vec![PathName::from("polymer-eth")]),
        ]
    );

    let eth = fixture.launcher.relayer(RelayerRole::Eth2).expect("launched");
    assert_eq!(
        eth.calls(),
        vec![init([ETH, HUB], "eth-polymer"), RelayerCall::Start]
    );

    let saved = fixture.store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(&saved[0], devnet.runtime());

    let relayers = &devnet.runtime().relayers;
    assert!(relayers
        .get(RelayerRole::Ibc)
        .is_some_and(|r| r.process_id.is_some()));
    assert!(relayers
        .get(RelayerRole::VIbc)
        .is_some_and(|r| r.process_id.is_none()));
    assert!(relayers
        .get(RelayerRole::Eth2)
        .is_some_and(|r| r.process_id.is_some()));
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn a_running_ibc_relayer_drops_its_previous_paths(fixture: DevnetFixture) {
    let mut devnet = fixture.devnet();

    devnet
        .setup_relayers(&[ChainPair::new(WASM, OSMOSIS), ChainPair::new(HUB, ETH)])
        .await
        .expect("first round");
    devnet
        .setup_relayers(&[ChainPair::new(WASM, HUB)])
        .await
        .expect("second round");

    let ibc = fixture.launcher.relayer(RelayerRole::Ibc).expect("launched");
    let calls = ibc.calls();
    assert_eq!(
        calls[4..],
        [
            RelayerCall::DeletePath(PathName::from("wasm-osmosis")),
            init([WASM, HUB], "wasm-polymer"),
            RelayerCall::Connect(vec![PathName::from("wasm-polymer")]),
            RelayerCall::Update {
                path: PathName::from("wasm-polymer"),
                connection_hops: vec![ConnectionId::new(2)],
            },
            RelayerCall::Start,
        ]
    );

    let identity = devnet
        .runtime()
        .relayers
        .get(RelayerRole::Ibc)
        .expect("recorded");
    assert_eq!(
        identity.configuration.paths.keys().collect::<Vec<_>>(),
        [&PathName::from("wasm-polymer")]
    );
    assert!(devnet.runtime().relayers.get(RelayerRole::VIbc).is_some());
    assert_eq!(fixture.store.saved().len(), 2);
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn connecting_native_chains_needs_no_test_account(mut fixture: DevnetFixture) {
    for chain in fixture.runtime.chain_sets.iter_mut() {
        chain.accounts.clear();
    }
    let mut devnet = fixture.devnet();

    devnet
        .setup_relayers(&[ChainPair::new(WASM, OSMOSIS)])
        .await
        .expect("only connections are queried");

    let ibc = fixture.launcher.relayer(RelayerRole::Ibc).expect("launched");
    assert!(ibc.calls().contains(&RelayerCall::Update {
        path: PathName::from("wasm-osmosis"),
        connection_hops: vec![ConnectionId::new(1)],
    }));
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn nothing_is_launched_for_an_unsupported_pair(fixture: DevnetFixture) {
    let mut devnet = fixture.devnet();

    let err = devnet
        .setup_relayers(&[ChainPair::new(WASM, OSMOSIS), ChainPair::new(WASM, ETH)])
        .await
        .expect_err("no relayer serves a native/virtual pair");

    assert!(matches!(
        err,
        HandshakeError::Devnet(DevnetError::UnsupportedChainPair { ref src_id, ref dst_id, .. })
            if src_id == WASM && dst_id == ETH
    ));
    assert!(RelayerRole::ALL
        .iter()
        .all(|role| fixture.launcher.relayer(*role).is_none()));
    assert!(fixture.store.saved().is_empty());
    assert!(devnet.runtime().relayers.is_empty());
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn connecting_a_path_reports_the_new_connections(fixture: DevnetFixture) {
    let relayer = MockRelayer::new(
        fixture.network.clone(),
        fixture.config.prefixes.clone(),
        RelayerRole::Ibc,
    );
    let name = PathName::between(WASM, OSMOSIS);
    let path = Path::direct(PathEnd::new(WASM), PathEnd::new(OSMOSIS));
    relayer
        .init(Vec::new(), vec![(name.clone(), PathConfig::new(path))])
        .await
        .expect("configured");

    let wasm = fixture.native(WASM);
    let osmosis = fixture.native(OSMOSIS);
    let (on_wasm, on_osmosis) = connect_native_path(
        &relayer,
        &name,
        wasm.as_ref(),
        osmosis.as_ref(),
        &fixture.config.prefixes,
        fixture.config.poll,
    )
    .await
    .expect("connected");

    // wasm already has its connection to the hub
    assert_eq!(on_wasm, ConnectionId::new(1));
    assert_eq!(on_osmosis, ConnectionId::new(0));
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn connecting_gives_up_when_no_connection_shows_up(fixture: DevnetFixture) {
    let relayer = MockRelayer::new(
        fixture.network.clone(),
        fixture.config.prefixes.clone(),
        RelayerRole::VIbc,
    );
    let name = PathName::between(WASM, HUB);

    let wasm = fixture.native(WASM);
    let hub = fixture.native(HUB);
    let err = connect_native_path(
        &relayer,
        &name,
        wasm.as_ref(),
        hub.as_ref(),
        &fixture.config.prefixes,
        fixture.config.poll,
    )
    .await
    .expect_err("this relayer never connects native chains");

    assert!(matches!(err, HandshakeError::Timeout { .. }));
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn updating_an_unknown_path_fails(fixture: DevnetFixture) {
    let relayer = MockRelayer::new(
        fixture.network.clone(),
        fixture.config.prefixes.clone(),
        RelayerRole::VIbc,
    );

    let err = relayer
        .update(&PathName::between(HUB, ETH), &[ConnectionId::new(0)])
        .await
        .expect_err("path never configured");

    assert_eq!(
        err.to_string(),
        "relayer `vibc-relayer` has no path `polymer-eth`"
    );
}
