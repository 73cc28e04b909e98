//! Error types for the change feed.

/// Errors that can occur while listening for change notifications.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Failed to establish or keep the LISTEN connection.
    #[error("Listen connection error: {0}")]
    Listen(#[from] sqlx_core::error::Error),

    /// The downstream event channel was closed by the consumer.
    #[error("Change event channel closed")]
    ChannelClosed,
}
