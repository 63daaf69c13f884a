use std::sync::Arc;

use ibc_devnet_types::config::PollConfig;
use ibc_devnet_types::event::{EventAttributes, EventsFilter};
use tracing::debug;

use crate::chain::EventSource;
use crate::error::HandshakeError;
use crate::poll::Poller;

/// Waits for named events on one chain without ever looking at a height twice.
///
/// The watcher remembers a lower bound, starting at the height it was created at. Every query
/// covers `[min_height, latest]`; a miss moves the bound past `latest`, a hit moves it to the
/// height the event was found at, so the same event can be awaited again by a later step.
pub struct EventWatcher<S: ?Sized> {
    source: Arc<S>,
    min_height: u64,
    poll: PollConfig,
}

impl<S: ?Sized> Clone for EventWatcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            min_height: self.min_height,
            poll: self.poll,
        }
    }
}

impl<S> EventWatcher<S>
where
    S: EventSource + ?Sized,
{
    /// A watcher starting at the chain's current height.
    pub async fn new(source: Arc<S>, poll: PollConfig) -> Result<Self, HandshakeError> {
        let min_height = source.latest_height().await?;

        Ok(Self::starting_at(source, min_height, poll))
    }

    pub fn starting_at(source: Arc<S>, min_height: u64, poll: PollConfig) -> Self {
        Self {
            source,
            min_height,
            poll,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn min_height(&self) -> u64 {
        self.min_height
    }

    /// Attributes of the first `name` event at or after the lower bound.
    pub async fn wait_for_event(&mut self, name: &str) -> Result<EventAttributes, HandshakeError> {
        self.wait_for_matching(name, |_| true).await
    }

    /// Like [`EventWatcher::wait_for_event`], skipping `name` events whose attributes `accept`
    /// turns down.
    pub async fn wait_for_matching<F>(
        &mut self,
        name: &str,
        accept: F,
    ) -> Result<EventAttributes, HandshakeError>
    where
        F: Fn(&EventAttributes) -> bool + Send + Sync,
    {
        let chain_id = self.source.chain_id().to_string();
        let mut poller = Poller::new(
            self.poll,
            format!("event `{name}` on chain `{chain_id}`"),
        );

        loop {
            let latest = self.source.latest_height().await?;
            let filter = EventsFilter::range(self.min_height, latest);

            let found = self.source.events(&filter).await?.into_iter().find_map(|tx| {
                tx.get(name)
                    .filter(|attributes| accept(*attributes))
                    .cloned()
                    .map(|attributes| (tx.height, attributes))
            });

            if let Some((height, attributes)) = found {
                debug!(%chain_id, event = name, height, "event observed");
                self.min_height = height;
                return Ok(attributes);
            }

            self.min_height = self.min_height.max(latest.saturating_add(1));
            poller.wait().await?;
        }
    }
}
