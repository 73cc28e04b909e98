//! Publishing seam between the router and the durable bus.

use async_trait::async_trait;
use serde_json::Value;

use clinicore_bus::{BusError, EventBus};

/// What the router needs from the bus: publish and nothing else.
///
/// The seam keeps the router testable and lets deployments swap the broker
/// client without touching fan-out logic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event, optionally under an explicit routing key.
    async fn publish(
        &self,
        event_type: &str,
        data: Value,
        routing_key: Option<&str>,
    ) -> Result<(), BusError>;
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(
        &self,
        event_type: &str,
        data: Value,
        routing_key: Option<&str>,
    ) -> Result<(), BusError> {
        EventBus::publish(self, event_type, data, routing_key).await
    }
}
