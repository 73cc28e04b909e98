//! Durable event bus over an AMQP topic exchange.
//!
//! Other backend services consume Clinicore's change events through a topic
//! broker. This crate wraps the broker client with:
//! - bounded-retry connect (fatal at startup on final failure)
//! - persistent publishes wrapped in a traceable [`EventEnvelope`]
//! - pattern-bound durable queues with fair dispatch (prefetch 1) and
//!   manual acknowledgment
//!
//! Delivery is at-least-once: a handler error nacks with requeue and the
//! message comes back, possibly reordered relative to fresh ones. Consumers
//! must be idempotent. There is no dead-letter cap; a handler that always
//! errors will see its message forever.

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;

pub use bus::EventBus;
pub use config::BusConfig;
pub use envelope::EventEnvelope;
pub use error::BusError;
pub use handler::EventHandler;
