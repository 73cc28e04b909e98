//! Subscription handler trait.

use async_trait::async_trait;

use crate::envelope::EventEnvelope;
use crate::error::BusError;

/// Handler for events consumed from a subscription.
///
/// `Ok` acknowledges the delivery; `Err` negative-acknowledges it with
/// requeue, so the broker redelivers later (at-least-once). Handlers must
/// therefore tolerate duplicates.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivered event.
    async fn handle(&self, event: EventEnvelope) -> Result<(), BusError>;
}
