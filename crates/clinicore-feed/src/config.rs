//! Configuration for the change feed.

use serde::{Deserialize, Serialize};

/// Configuration for a change-feed listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Prefix for NOTIFY channel names; the table name is appended,
    /// e.g. `clinicore_changes_appointments`.
    pub channel_prefix: String,

    /// Delay before reconnecting after a listen failure, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "clinicore_changes".into(),
            reconnect_delay_ms: 5000,
        }
    }
}

impl FeedConfig {
    /// Sets the channel prefix.
    #[must_use]
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Sets the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay_ms(mut self, delay: u64) -> Self {
        self.reconnect_delay_ms = delay;
        self
    }
}
