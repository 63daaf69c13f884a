//! Fixed attempt-count, fixed-delay waiting shared by every loop that watches another process.

use ibc_devnet_types::config::PollConfig;
use tracing::debug;

use crate::error::HandshakeError;

/// Counts the failed attempts of one wait loop.
///
/// The caller checks its condition first and calls [`Poller::wait`] on a miss. The loop gives up
/// once `retries` misses have been waited out, so the total time spent asleep never exceeds
/// [`PollConfig::budget`].
#[derive(Debug)]
pub struct Poller {
    target: String,
    config: PollConfig,
    attempts: u32,
}

impl Poller {
    pub fn new(config: PollConfig, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            config,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleeps one interval, then fails with a timeout naming the target if the budget is spent.
    pub async fn wait(&mut self) -> Result<(), HandshakeError> {
        self.attempts += 1;
        debug!(
            waiting_for = %self.target,
            attempt = self.attempts,
            retries = self.config.retries,
            "not there yet"
        );

        tokio::time::sleep(self.config.interval).await;

        if self.attempts >= self.config.retries {
            return Err(HandshakeError::Timeout {
                target: self.target.clone(),
                attempts: self.attempts,
            });
        }

        Ok(())
    }
}
