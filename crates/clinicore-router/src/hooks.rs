//! Side-effect seams dispatched by the router.

use async_trait::async_trait;

use clinicore_core::ChangeEvent;

use crate::error::RouterError;

/// A side effect reacting to change events.
///
/// Hooks run in isolated tasks; an error (or a slow hook) in one never
/// affects the others or the fan-out itself. Typical hooks: notification
/// triggers on new appointments, conflict re-checks, cancellation handling
/// on deletes.
#[async_trait]
pub trait ChangeHook: Send + Sync {
    /// Unique name for this hook, for logging.
    fn name(&self) -> &str;

    /// Whether this hook wants the given event.
    ///
    /// Default accepts everything; override to scope to an operation kind,
    /// a table, or specific changed fields.
    fn matches(&self, _event: &ChangeEvent) -> bool {
        true
    }

    /// Handle one change event.
    async fn handle(&self, event: &ChangeEvent) -> Result<(), RouterError>;
}

/// Downstream cache refresh, fire-and-forget.
///
/// The cache is an external collaborator; an invalidation failure only
/// means staler reads, so errors are logged and dropped.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, event: &ChangeEvent) -> Result<(), RouterError>;
}
