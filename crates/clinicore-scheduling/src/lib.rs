//! Scheduling-conflict detection.
//!
//! The booking path calls [`ConflictDetector::check`] synchronously before
//! committing a write and must abort the write when a conflict is reported.
//! Detection is read-only and computed fresh per request; results are never
//! cached, since staleness would produce double-bookings.

pub mod detector;
pub mod error;
pub mod interval;
pub mod reader;

pub use detector::{ConflictDetector, ConflictResult};
pub use error::SchedulingError;
pub use interval::intervals_overlap;
pub use reader::AppointmentReader;
