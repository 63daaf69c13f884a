//! The chain-agnostic shape every event backend reports in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attributes of one event, keyed by attribute name.
pub type EventAttributes = BTreeMap<String, String>;

/// Every named event observed at one height.
///
/// When the same event type is emitted more than once at a height, the attributes of the last
/// emission are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub height: u64,
    pub events: BTreeMap<String, EventAttributes>,
}

impl TxEvent {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            events: BTreeMap::new(),
        }
    }

    pub fn with_event(mut self, name: impl Into<String>, attributes: EventAttributes) -> Self {
        self.events.insert(name.into(), attributes);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EventAttributes> {
        self.events.get(name)
    }
}

/// Folds `(height, name, attributes)` triples into one [`TxEvent`] per height, in ascending
/// height order. Heights without any event never show up.
pub fn group_by_height<I>(events: I) -> Vec<TxEvent>
where
    I: IntoIterator<Item = (u64, String, EventAttributes)>,
{
    let mut by_height = BTreeMap::<u64, TxEvent>::new();

    for (height, name, attributes) in events {
        by_height
            .entry(height)
            .or_insert_with(|| TxEvent::new(height))
            .events
            .insert(name, attributes);
    }

    by_height.into_values().collect()
}

/// Selects the heights an event query covers.
///
/// A set `height` overrides the range. A missing `max_height` leaves the range open-ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsFilter {
    pub height: Option<u64>,
    pub min_height: u64,
    pub max_height: Option<u64>,
}

impl EventsFilter {
    pub fn at(height: u64) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn range(min_height: u64, max_height: u64) -> Self {
        Self {
            height: None,
            min_height,
            max_height: Some(max_height),
        }
    }

    /// Inclusive lower and upper bound of the covered heights.
    pub fn bounds(&self) -> (u64, Option<u64>) {
        match self.height {
            Some(height) => (height, Some(height)),
            None => (self.min_height, self.max_height),
        }
    }

    pub fn contains(&self, height: u64) -> bool {
        let (min, max) = self.bounds();
        height >= min && max.map_or(true, |max| height <= max)
    }

    /// An empty range never matches anything, so backends may skip the query altogether.
    pub fn is_empty(&self) -> bool {
        matches!(self.bounds(), (min, Some(max)) if min > max)
    }
}
