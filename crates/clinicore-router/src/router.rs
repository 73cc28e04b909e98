//! The fan-out orchestrator.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use clinicore_core::ChangeEvent;
use clinicore_realtime::ConnectionRegistry;

use crate::hooks::{CacheInvalidator, ChangeHook};
use crate::publisher::EventPublisher;
use crate::routing::{
    client_event_name, rooms_for, routing_key, status_event_name, status_routing_key,
};

/// Routes change events to live clients, the durable bus and side-effect
/// hooks.
///
/// Construction is builder-style; everything but the registry is optional,
/// and a missing surface simply skips its step. Each step is fault-isolated:
/// an unavailable bus must not block live clients and a failing hook must
/// not block anything.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    publisher: Option<Arc<dyn EventPublisher>>,
    hooks: Vec<Arc<dyn ChangeHook>>,
    cache: Option<Arc<dyn CacheInvalidator>>,
}

impl EventRouter {
    /// Creates a router broadcasting to the given registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            publisher: None,
            hooks: Vec::new(),
            cache: None,
        }
    }

    /// Sets the durable bus publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Registers a side-effect hook.
    #[must_use]
    pub fn register_hook(mut self, hook: Arc<dyn ChangeHook>) -> Self {
        debug!(hook = %hook.name(), "Registered change hook");
        self.hooks.push(hook);
        self
    }

    /// Sets the downstream cache invalidator.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fans one change event out to all delivery surfaces.
    ///
    /// Returns nothing consumers can depend on; every failure is handled
    /// (logged) inside its own step.
    pub async fn on_change_event(&self, event: ChangeEvent) {
        debug!(
            table = %event.table,
            op = %event.op,
            entity_id = %event.entity_id,
            "Routing change event"
        );

        self.broadcast(&event);
        self.publish(&event).await;
        self.dispatch_hooks(&event);
        self.invalidate_cache(&event);
    }

    /// Consumes a change-feed channel until it closes.
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<ChangeEvent>) {
        info!("Starting event router");
        while let Some(event) = receiver.recv().await {
            self.on_change_event(event).await;
        }
        info!("Change event channel closed, event router stopping");
    }

    /// Step 1: live clients, everyone first and then each interested room.
    fn broadcast(&self, event: &ChangeEvent) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize change event for broadcast");
                return;
            }
        };
        let name = client_event_name(event);

        self.registry.broadcast_to_all(&name, payload.clone());
        for room in rooms_for(event) {
            self.registry.broadcast_to_room(&room, &name, payload.clone());
        }
        if let Some((from, to)) = event.status_transition() {
            let status_name = status_event_name(event.table);
            let status_payload = self.status_payload(event, from, to);
            for room in rooms_for(event) {
                self.registry
                    .broadcast_to_room(&room, &status_name, status_payload.clone());
            }
        }
    }

    /// Step 2: durable bus, generic key plus the status-change key.
    ///
    /// A publish failure is logged and swallowed here: the database write
    /// already happened and live clients already got step 1. The event is
    /// lost to bus consumers (no outbox); callers that need a guarantee
    /// call `EventBus::publish` directly on the write path.
    async fn publish(&self, event: &ChangeEvent) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        let key = routing_key(event);
        match serde_json::to_value(event) {
            Ok(payload) => {
                if let Err(e) = publisher.publish(&key, payload, None).await {
                    error!(routing_key = %key, error = %e, "Bus publish failed, event lost to bus consumers");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize change event for publish"),
        }

        if let Some((from, to)) = event.status_transition() {
            let key = status_routing_key(event.table);
            let payload = self.status_payload(event, from, to);
            if let Err(e) = publisher.publish(&key, payload, None).await {
                error!(routing_key = %key, error = %e, "Status-change publish failed");
            }
        }
    }

    /// Step 3: side-effect hooks, each in its own task.
    fn dispatch_hooks(&self, event: &ChangeEvent) {
        for hook in &self.hooks {
            if !hook.matches(event) {
                continue;
            }
            let hook = hook.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = hook.handle(&event).await {
                    warn!(hook = %hook.name(), error = %e, "Change hook failed");
                }
            });
        }
    }

    /// Step 4: downstream cache, fire-and-forget.
    fn invalidate_cache(&self, event: &ChangeEvent) {
        let Some(cache) = &self.cache else {
            return;
        };
        let cache = cache.clone();
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.invalidate(&event).await {
                warn!(error = %e, "Cache invalidation failed");
            }
        });
    }

    fn status_payload(&self, event: &ChangeEvent, from: &str, to: &str) -> Value {
        json!({
            "entity_id": event.entity_id,
            "from": from,
            "to": to,
            "doctor_id": event.doctor_id,
            "patient_id": event.patient_id,
            "date": event.date,
        })
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("hooks", &self.hooks.len())
            .field("has_publisher", &self.publisher.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}
