use ibc_core_channel_types::channel::{Order, State};
use ibc_core_channel_types::Version;
use ibc_core_host_types::identifiers::{ChannelId, ConnectionId, PortId};
use ibc_devnet::devnet::Devnet;
use ibc_devnet::error::{ChainError, HandshakeError};
use ibc_devnet::flow::HandshakeFlow;
use ibc_devnet::handshake::CONNECT_IBC_CHANNEL;
use ibc_devnet::relayer::Relayer;
use ibc_devnet_testkit::fixtures::{
    DevnetFixture, DAPP_ADDRESS, ETH, HUB, OSMOSIS, WASM, WASM_PORT,
};
use ibc_devnet_types::endpoint::{ChannelEndpoint, ChannelRequest, Endpoint};
use ibc_devnet_types::error::DevnetError;
use ibc_devnet_types::msgs::{
    CHAN_OPEN_ACK_TYPE_URL, CHAN_OPEN_CONFIRM_TYPE_URL, CHAN_OPEN_INIT_TYPE_URL,
    CHAN_OPEN_TRY_TYPE_URL, REGISTER_PORT_TYPE_URL,
};
use ibc_devnet_types::relayer::{ChainPair, PathName, RelayerRole};
use rstest::*;

const VERSION: &str = "1.0";
const HUB_PORT: &str = "polyibc.sim-test-0.5fbdb2315678afecb367f032d93f642f64180aa3";

#[fixture]
fn fixture() -> DevnetFixture {
    DevnetFixture::new()
}

fn eth_endpoint() -> Endpoint {
    Endpoint::new(ETH, DAPP_ADDRESS, VERSION)
}

fn wasm_endpoint() -> Endpoint {
    Endpoint::new(WASM, WASM_PORT, VERSION)
}

fn port(id: &str) -> PortId {
    id.parse().expect("valid port id")
}

/// A devnet whose hub/virtual relayers are set up.
async fn bridged(fixture: &DevnetFixture) -> Devnet {
    let mut devnet = fixture.devnet();
    devnet
        .setup_relayers(&[ChainPair::new(HUB, ETH)])
        .await
        .expect("relayers set up");
    devnet
}

fn assert_connected(fixture: &DevnetFixture, channel_id: &ChannelId) {
    let connected = fixture.virtual_chain(ETH).events().into_iter().any(|tx| {
        tx.get(CONNECT_IBC_CHANNEL).is_some_and(|attributes| {
            attributes
                .get("portAddress")
                .is_some_and(|address| address.eq_ignore_ascii_case(DAPP_ADDRESS))
                && attributes.get("channelId") == Some(&channel_id.to_string())
        })
    });

    assert!(connected, "no {CONNECT_IBC_CHANNEL} event for {channel_id}");
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn virtual_to_native_opens_both_ends(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;

    let outcome = devnet
        .create_channel(&ChannelRequest::unordered(eth_endpoint(), wasm_endpoint()))
        .await
        .expect("channel open");

    assert_eq!(
        outcome.a,
        ChannelEndpoint {
            chain: ETH.to_string(),
            port_id: HUB_PORT.to_string(),
            channel_id: "channel-0".to_string(),
        }
    );
    assert_eq!(
        outcome.b,
        ChannelEndpoint {
            chain: WASM.to_string(),
            port_id: WASM_PORT.to_string(),
            channel_id: "channel-0".to_string(),
        }
    );

    let hub = fixture.native(HUB);
    let wasm = fixture.native(WASM);
    let channel_id = ChannelId::new(0);

    let hub_end = hub.channel(&port(HUB_PORT), &channel_id).expect("hub end");
    assert_eq!(hub_end.state, State::Open);
    assert_eq!(hub_end.ordering, Order::Unordered);
    assert_eq!(hub_end.counterparty_port_id, port(WASM_PORT));
    assert_eq!(hub_end.counterparty_channel_id, Some(channel_id.clone()));
    assert_eq!(
        hub_end.connection_hops,
        [ConnectionId::new(0), ConnectionId::new(2)]
    );

    let wasm_end = wasm.channel(&port(WASM_PORT), &channel_id).expect("wasm end");
    assert_eq!(wasm_end.state, State::Open);
    assert_eq!(wasm_end.counterparty_port_id, port(HUB_PORT));
    assert_eq!(wasm_end.counterparty_channel_id, Some(channel_id.clone()));
    assert_eq!(wasm_end.version, Version::new(VERSION.to_string()));
    assert_eq!(
        wasm_end.connection_hops,
        [ConnectionId::new(0), ConnectionId::new(1)]
    );

    assert_eq!(hub.submitted(), [CHAN_OPEN_ACK_TYPE_URL]);
    assert_eq!(
        wasm.submitted(),
        [CHAN_OPEN_TRY_TYPE_URL, CHAN_OPEN_CONFIRM_TYPE_URL]
    );
    assert_connected(&fixture, &channel_id);
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn native_to_virtual_opens_both_ends(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;

    let outcome = devnet
        .create_channel(&ChannelRequest {
            ordering: Order::Ordered,
            ..ChannelRequest::unordered(wasm_endpoint(), eth_endpoint())
        })
        .await
        .expect("channel open");

    assert_eq!(outcome.a.chain, WASM);
    assert_eq!(outcome.a.channel_id, "channel-0");
    assert_eq!(outcome.b.chain, ETH);
    assert_eq!(outcome.b.port_id, HUB_PORT);
    assert_eq!(outcome.b.channel_id, "channel-0");

    let hub = fixture.native(HUB);
    let wasm = fixture.native(WASM);
    let channel_id = ChannelId::new(0);

    let hub_end = hub.channel(&port(HUB_PORT), &channel_id).expect("hub end");
    assert_eq!(hub_end.state, State::Open);
    assert_eq!(hub_end.ordering, Order::Ordered);
    assert_eq!(hub_end.counterparty_channel_id, Some(channel_id.clone()));

    let wasm_end = wasm.channel(&port(WASM_PORT), &channel_id).expect("wasm end");
    assert_eq!(wasm_end.state, State::Open);
    assert_eq!(wasm_end.counterparty_port_id, port(HUB_PORT));
    assert_eq!(wasm_end.counterparty_channel_id, Some(channel_id.clone()));

    assert_eq!(
        wasm.submitted(),
        [CHAN_OPEN_INIT_TYPE_URL, CHAN_OPEN_ACK_TYPE_URL]
    );
    assert_eq!(hub.submitted(), [CHAN_OPEN_CONFIRM_TYPE_URL]);
    assert_connected(&fixture, &channel_id);
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn later_channels_get_fresh_identifiers(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;

    devnet
        .create_channel(&ChannelRequest::unordered(eth_endpoint(), wasm_endpoint()))
        .await
        .expect("first channel");
    let outcome = devnet
        .create_channel(&ChannelRequest::unordered(wasm_endpoint(), eth_endpoint()))
        .await
        .expect("second channel");

    assert_eq!(outcome.a.channel_id, "channel-1");
    assert_eq!(outcome.b.channel_id, "channel-1");
    assert_connected(&fixture, &ChannelId::new(1));

    let vibc = fixture
        .launcher
        .relayer(RelayerRole::VIbc)
        .expect("launched");
    assert!(vibc.identity().process_id.is_some());
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn the_started_vibc_relayer_is_recorded(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;

    devnet
        .create_channel(&ChannelRequest::unordered(eth_endpoint(), wasm_endpoint()))
        .await
        .expect("channel open");

    let recorded = devnet
        .runtime()
        .relayers
        .get(RelayerRole::VIbc)
        .expect("recorded")
        .clone();
    assert!(recorded.process_id.is_some());
    assert_eq!(
        recorded.configuration.paths[&PathName::between(HUB, ETH)].connection_hops,
        [ConnectionId::new(0), ConnectionId::new(2)]
    );
    assert_eq!(fixture.store.saved().len(), 2);
    assert_eq!(fixture.store.saved()[1], *devnet.runtime());

    devnet
        .create_channel(&ChannelRequest::unordered(wasm_endpoint(), eth_endpoint()))
        .await
        .expect("second channel");

    let vibc = fixture
        .launcher
        .relayer(RelayerRole::VIbc)
        .expect("launched");
    assert_eq!(vibc.spawned(), 1);
    assert_eq!(fixture.store.saved().len(), 3);
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn a_port_is_registered_once(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;
    let request = ChannelRequest {
        register_port: true,
        ..ChannelRequest::unordered(eth_endpoint(), wasm_endpoint())
    };

    devnet.create_channel(&request).await.expect("channel open");

    let hub = fixture.native(HUB);
    let registered = hub.registered_ports();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, "sim-test-0");
    assert_eq!(registered[0].1.len(), 20);
    assert_eq!(hub.submitted()[0], REGISTER_PORT_TYPE_URL);

    let err = devnet
        .create_channel(&request)
        .await
        .expect_err("the hub refuses a second registration");

    assert!(matches!(
        err,
        HandshakeError::Chain(ChainError::BroadcastFailed { ref chain_id, .. }) if chain_id == HUB
    ));
    // the relayer the failed attempt attached to is still recorded
    assert_eq!(fixture.store.saved().len(), 3);
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn virtual_endpoints_need_the_vibc_relayer(fixture: DevnetFixture) {
    let mut devnet = fixture.devnet();

    let err = devnet
        .create_channel(&ChannelRequest::unordered(eth_endpoint(), wasm_endpoint()))
        .await
        .expect_err("no relayer set up");

    assert!(matches!(
        err,
        HandshakeError::MissingRelayer {
            role: RelayerRole::VIbc
        }
    ));
    assert!(fixture.native(WASM).submitted().is_empty());
}

#[rstest]
#[case(WASM, WASM_PORT, OSMOSIS, "transfer", HandshakeFlow::NativeToNative)]
#[case(ETH, DAPP_ADDRESS, ETH, DAPP_ADDRESS, HandshakeFlow::VirtualToVirtual)]
#[test_log::test(tokio::test(start_paused = true))]
async fn unsupported_flows_change_nothing(
    fixture: DevnetFixture,
    #[case] a: &str,
    #[case] a_port: &str,
    #[case] b: &str,
    #[case] b_port: &str,
    #[case] expected: HandshakeFlow,
) {
    let mut devnet = bridged(&fixture).await;
    let request = ChannelRequest::unordered(
        Endpoint::new(a, a_port, VERSION),
        Endpoint::new(b, b_port, VERSION),
    );

    let err = devnet
        .create_channel(&request)
        .await
        .expect_err("unsupported flow");

    assert!(matches!(err, HandshakeError::UnsupportedFlow { flow } if flow == expected));
    assert!([HUB, WASM, OSMOSIS]
        .iter()
        .all(|chain| fixture.native(chain).submitted().is_empty()));
}

#[rstest]
#[test_log::test(tokio::test(start_paused = true))]
async fn unknown_chains_are_named(fixture: DevnetFixture) {
    let mut devnet = bridged(&fixture).await;

    let err = devnet
        .create_channel(&ChannelRequest::unordered(
            Endpoint::new("juno", "transfer", VERSION),
            wasm_endpoint(),
        ))
        .await
        .expect_err("juno is not part of the devnet");

    assert!(matches!(
        err,
        HandshakeError::Devnet(DevnetError::UnknownChain { ref chain_id }) if chain_id == "juno"
    ));
}
