//! Core domain types for the Clinicore event and scheduling subsystem.
//!
//! This crate defines the shared vocabulary used across the workspace:
//! - [`appointment`]: the appointment entity as mirrored from the
//!   system-of-record, plus its status/type enums
//! - [`events`]: change events derived from row-level change notifications
//!
//! Clinicore does not own appointment storage. The types here describe rows
//! the surrounding system commits; this core only observes and reacts.

pub mod appointment;
pub mod events;

pub use appointment::{Appointment, AppointmentStatus, AppointmentType};
pub use events::{ChangeEvent, ChangeOp, WatchedTable};
