//! Error type for side-effect hooks.

/// Error returned by side-effect hooks.
///
/// Hook errors are logged by the router and never propagate to the event
/// source.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Hook execution failed with a message.
    #[error("Hook execution failed: {0}")]
    Hook(String),
}

impl RouterError {
    /// Creates a hook execution error from a string.
    #[must_use]
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook(message.into())
    }
}
