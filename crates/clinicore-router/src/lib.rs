//! Change event fan-out.
//!
//! The [`EventRouter`] sits between the change feed and the delivery
//! surfaces. For every [`clinicore_core::ChangeEvent`] it runs four
//! independent, individually fault-isolated steps:
//!
//! 1. broadcast to live clients (everyone, plus the doctor/patient/date/
//!    record rooms the event touches)
//! 2. publish to the durable bus under a routing key derived from the
//!    event, plus a secondary status-change publish
//! 3. dispatch registered side-effect hooks (notification triggers,
//!    conflict re-checks, cancellation handling)
//! 4. fire-and-forget cache invalidation
//!
//! A failing step never prevents the others: a down broker must not stop
//! live clients from seeing the update, and vice versa.

pub mod error;
pub mod hooks;
pub mod publisher;
pub mod router;
pub mod routing;

pub use error::RouterError;
pub use hooks::{CacheInvalidator, ChangeHook};
pub use publisher::EventPublisher;
pub use router::EventRouter;
pub use routing::{
    client_event_name, rooms_for, routing_key, status_event_name, status_routing_key,
};
