//! Live client connections, rooms and best-effort push.
//!
//! The [`ConnectionRegistry`] tracks bidirectional push connections, their
//! room memberships and optional identity binding, and broadcasts change
//! events to one connection, one room, or everyone. Delivery is strictly
//! best-effort: real-time updates are an enhancement, never a correctness
//! requirement for the underlying data write, so broadcast paths log and
//! return instead of erroring.
//!
//! Rooms are plain string keys (`doctor_<id>`, `patient_<id>`,
//! `date_<yyyy-mm-dd>`, `record_<id>`). They have no lifecycle of their own:
//! a room is the set of connections currently joined to that key and
//! vanishes when empty.
//!
//! The [`ws`] module supplies the axum WebSocket glue; the registry itself
//! is transport-agnostic and talks to connections through per-connection
//! outbound channels.

pub mod client;
pub mod config;
pub mod registry;
pub mod rooms;
pub mod ws;

pub use client::{ClientId, ClientMessage, ClientRole, ConnectedClient, OutboundFrame};
pub use config::RealtimeConfig;
pub use registry::ConnectionRegistry;
pub use rooms::{date_room, doctor_room, patient_room, record_room};
pub use ws::{RealtimeState, router, ws_handler};
