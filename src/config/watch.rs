use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Resolution-side settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Bound for the snapshot read that anchors every watch
    /// Default: 3000
    #[serde(default = "default_initial_read_timeout")]
    pub initial_read_timeout_in_ms: u64,

    /// Batches buffered between a watcher and its consumer.
    ///
    /// When the consumer lags, the watcher stops pulling from the store
    /// until there is room again. Must be at least 1 so the snapshot batch
    /// never blocks.
    /// Default: 16
    #[serde(default = "default_batch_channel_capacity")]
    pub batch_channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            initial_read_timeout_in_ms: default_initial_read_timeout(),
            batch_channel_capacity: default_batch_channel_capacity(),
        }
    }
}

impl WatchConfig {
    pub fn initial_read_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_read_timeout_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_read_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.initial_read_timeout_in_ms must be greater than zero".into(),
            )));
        }
        if self.batch_channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.batch_channel_capacity must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

fn default_initial_read_timeout() -> u64 {
    3000
}
fn default_batch_channel_capacity() -> usize {
    16
}
