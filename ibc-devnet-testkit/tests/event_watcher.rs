use std::sync::Arc;
use std::time::Duration;

use ibc_devnet::error::HandshakeError;
use ibc_devnet::event::EventWatcher;
use ibc_devnet::handshake::{CHANNEL_OPEN_INIT, CONNECT_IBC_CHANNEL};
use ibc_devnet_testkit::chains::{MockChain, MockVirtualChain};
use ibc_devnet_testkit::fixtures::{test_config, ETH, WASM};
use ibc_devnet_types::event::EventAttributes;
use tokio::time::Instant;

fn channel_attributes(channel_id: &str) -> EventAttributes {
    [("channel_id".to_string(), channel_id.to_string())]
        .into_iter()
        .collect()
}

#[test_log::test(tokio::test(start_paused = true))]
async fn waits_for_an_event_emitted_later() {
    let chain = Arc::new(MockVirtualChain::new(ETH));
    let mut watcher = EventWatcher::new(chain.clone(), test_config().poll)
        .await
        .expect("height query");

    let emitter = chain.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        emitter.emit(CONNECT_IBC_CHANNEL, channel_attributes("channel-4"));
    });

    let attributes = watcher
        .wait_for_event(CONNECT_IBC_CHANNEL)
        .await
        .expect("event emitted within the budget");

    assert_eq!(
        attributes.get("channel_id").map(String::as_str),
        Some("channel-4")
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn events_before_the_watcher_are_never_seen() {
    let config = test_config();
    let chain = Arc::new(MockChain::new(WASM));
    chain.emit(CHANNEL_OPEN_INIT, channel_attributes("channel-0"));

    let mut watcher = EventWatcher::new(chain.clone(), config.poll)
        .await
        .expect("height query");
    let started = Instant::now();

    let err = watcher
        .wait_for_event(CHANNEL_OPEN_INIT)
        .await
        .expect_err("stale event");

    assert_eq!(started.elapsed(), config.poll.budget());
    assert!(matches!(
        err,
        HandshakeError::Timeout { attempts, .. } if attempts == config.poll.retries
    ));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn a_found_event_can_be_awaited_again() {
    let chain = Arc::new(MockChain::new(WASM));
    let mut watcher = EventWatcher::new(chain.clone(), test_config().poll)
        .await
        .expect("height query");

    let height = chain.emit(CHANNEL_OPEN_INIT, channel_attributes("channel-0"));
    let first = watcher
        .wait_for_event(CHANNEL_OPEN_INIT)
        .await
        .expect("first wait");
    let second = watcher
        .wait_for_event(CHANNEL_OPEN_INIT)
        .await
        .expect("second wait");

    assert_eq!(first, second);
    assert_eq!(watcher.min_height(), height);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn the_first_matching_height_wins() {
    let chain = Arc::new(MockChain::new(WASM));
    let mut watcher = EventWatcher::new(chain.clone(), test_config().poll)
        .await
        .expect("height query");

    chain.emit(CHANNEL_OPEN_INIT, channel_attributes("channel-0"));
    chain.emit(CHANNEL_OPEN_INIT, channel_attributes("channel-1"));

    let attributes = watcher
        .wait_for_event(CHANNEL_OPEN_INIT)
        .await
        .expect("events emitted");

    assert_eq!(
        attributes.get("channel_id").map(String::as_str),
        Some("channel-0")
    );
}
