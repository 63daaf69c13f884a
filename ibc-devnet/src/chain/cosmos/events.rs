//! Turns the result of a committed transaction into `(name, attributes)` pairs.

use std::collections::BTreeSet;

use ibc_devnet_types::event::{group_by_height, EventAttributes, TxEvent};
use serde::Deserialize;
use tendermint::abci::Event;

#[derive(Deserialize)]
struct RawMessageLog {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

#[derive(Deserialize)]
struct RawAttribute {
    key: String,
    #[serde(default)]
    value: String,
}

/// Parses the JSON raw log older Cosmos SDK versions attach to a transaction result: one entry
/// per message, each listing its events.
pub fn parse_raw_log(log: &str) -> Result<Vec<(String, EventAttributes)>, serde_json::Error> {
    let messages: Vec<RawMessageLog> = serde_json::from_str(log)?;

    Ok(messages
        .into_iter()
        .flat_map(|message| message.events)
        .map(|event| {
            let attributes = event
                .attributes
                .into_iter()
                .map(|attribute| (attribute.key, attribute.value))
                .collect();
            (event.kind, attributes)
        })
        .collect())
}

/// Reads the structured events newer SDK versions report instead of a raw log. Attributes that
/// are not valid UTF-8 are left out.
pub fn from_abci_events(events: &[Event]) -> Vec<(String, EventAttributes)> {
    events
        .iter()
        .map(|event| {
            let attributes = event
                .attributes
                .iter()
                .filter_map(|attribute| {
                    let key = attribute.key_str().ok()?;
                    let value = attribute.value_str().ok()?;
                    Some((key.to_string(), value.to_string()))
                })
                .collect();
            (event.kind.clone(), attributes)
        })
        .collect()
}

/// One transaction result of a `tx_search` page.
#[derive(Clone, Copy, Debug)]
pub struct SearchedTx<'a> {
    pub height: u64,
    pub failed: bool,
    pub log: &'a str,
    pub events: &'a [Event],
}

/// Folds searched transactions into events grouped by height.
///
/// Failed transactions contribute nothing. A height holding a transaction whose raw log does not
/// parse is dropped as a whole, including the events of its well-formed transactions.
#[derive(Debug, Default)]
pub struct EventCollector {
    collected: Vec<(u64, String, EventAttributes)>,
    malformed: BTreeSet<u64>,
}

impl EventCollector {
    pub fn push(&mut self, tx: SearchedTx<'_>) -> Result<(), serde_json::Error> {
        if tx.failed {
            return Ok(());
        }

        let events = if tx.log.is_empty() {
            from_abci_events(tx.events)
        } else {
            match parse_raw_log(tx.log) {
                Ok(events) => events,
                Err(e) => {
                    self.malformed.insert(tx.height);
                    return Err(e);
                }
            }
        };

        self.collected.extend(
            events
                .into_iter()
                .map(|(name, attributes)| (tx.height, name, attributes)),
        );

        Ok(())
    }

    pub fn finish(self) -> Vec<TxEvent> {
        let malformed = self.malformed;

        group_by_height(
            self.collected
                .into_iter()
                .filter(|(height, ..)| !malformed.contains(height)),
        )
    }
}

/// Whether another `tx_search` page follows `page` (1-based) of `per_page` results.
pub fn has_next_page(page: u32, per_page: u8, fetched: usize, total_count: u32) -> bool {
    let seen = page as usize * usize::from(per_page);

    fetched > 0 && seen < total_count as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN_INIT_LOG: &str = r#"[{"events": [
        {"type": "channel_open_init", "attributes": [{"key": "channel_id", "value": "channel-0"}]}
    ]}]"#;

    fn tx(height: u64, log: &str) -> SearchedTx<'_> {
        SearchedTx {
            height,
            failed: false,
            log,
            events: &[],
        }
    }

    #[test]
    fn raw_log_flattens_messages() {
        let log = r#"[
            {"msg_index": 0, "events": [
                {"type": "message", "attributes": [{"key": "action", "value": "/ibc.core.channel.v1.MsgChannelOpenInit"}]},
                {"type": "channel_open_init", "attributes": [
                    {"key": "port_id", "value": "wasm.abc"},
                    {"key": "channel_id", "value": "channel-3"}
                ]}
            ]}
        ]"#;

        let events = parse_raw_log(log).expect("well formed");

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].0, "channel_open_init");
        assert_eq!(events[1].1["channel_id"], "channel-3");
    }

    #[test]
    fn non_json_raw_log_is_rejected() {
        assert!(parse_raw_log("out of gas in location: WriteFlat").is_err());
    }

    #[test]
    fn structured_events_are_read() {
        let event = Event::new(
            "channel_open_try",
            [("channel_id", "channel-9"), ("port_id", "transfer")],
        );

        let events = from_abci_events(&[event]);

        assert_eq!(events[0].0, "channel_open_try");
        assert_eq!(events[0].1["port_id"], "transfer");
    }

    #[test]
    fn a_malformed_log_drops_its_whole_height() {
        let mut collector = EventCollector::default();

        collector.push(tx(7, OPEN_INIT_LOG)).expect("well formed");
        assert!(collector.push(tx(7, "out of gas")).is_err());
        collector.push(tx(8, OPEN_INIT_LOG)).expect("well formed");

        let events = collector.finish();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].height, 8);
        assert!(events[0].get("channel_open_init").is_some());
    }

    #[test]
    fn failed_transactions_are_skipped() {
        let mut collector = EventCollector::default();

        collector
            .push(SearchedTx {
                failed: true,
                ..tx(3, "not even json")
            })
            .expect("failed transactions are not parsed");

        assert!(collector.finish().is_empty());
    }

    #[test]
    fn structured_events_stand_in_for_an_empty_log() {
        let events = [Event::new("channel_open_try", [("channel_id", "channel-2")])];
        let mut collector = EventCollector::default();

        collector
            .push(SearchedTx {
                events: &events,
                ..tx(5, "")
            })
            .expect("no log to parse");

        let found = collector.finish();
        assert_eq!(found[0].height, 5);
        assert_eq!(
            found[0]
                .get("channel_open_try")
                .map(|attributes| attributes["channel_id"].as_str()),
            Some("channel-2")
        );
    }

    #[test]
    fn pages_are_read_until_the_total_is_seen() {
        assert!(has_next_page(1, 100, 100, 250));
        assert!(has_next_page(2, 100, 100, 250));
        assert!(!has_next_page(3, 100, 50, 250));
        assert!(!has_next_page(1, 100, 40, 40));
        assert!(!has_next_page(1, 100, 0, 250));
    }
}
