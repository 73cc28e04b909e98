//! Configuration for the realtime transport.

use serde::{Deserialize, Serialize};

/// Configuration for live connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound frames buffered per connection before new frames are
    /// dropped for that (slow) client.
    pub outbound_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
        }
    }
}

impl RealtimeConfig {
    /// Sets the per-connection outbound buffer capacity.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}
