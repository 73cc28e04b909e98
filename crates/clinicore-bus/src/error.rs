//! Error types for the event bus.

/// Errors that can occur on the event bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker could not be reached within the configured attempts.
    #[error("Broker connect failed after {attempts} attempts: {message}")]
    Connect {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last connection error.
        message: String,
    },

    /// Broker protocol error (publish, declare, consume, close).
    #[error("Broker error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker refused a confirmed publish; the message was not stored.
    #[error("Publish rejected by broker for routing key {routing_key}")]
    Rejected {
        /// Routing key of the rejected publish.
        routing_key: String,
    },

    /// Envelope (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A subscription handler failed; the delivery is requeued.
    #[error("Handler failed: {0}")]
    Handler(String),
}

impl BusError {
    /// Creates a new handler error.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
