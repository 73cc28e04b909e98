//! Scheduling error types.

/// Errors that can occur while checking for scheduling conflicts.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// The candidate interval is empty or inverted.
    #[error("Invalid interval: start {start} must be before end {end}")]
    InvalidInterval {
        /// Candidate start time.
        start: chrono::NaiveTime,
        /// Candidate end time.
        end: chrono::NaiveTime,
    },

    /// The underlying appointment read failed.
    ///
    /// Conflict status is unknown in this case; callers must refuse to
    /// proceed with the booking (fail closed, never fail open).
    #[error("Appointment read failed: {message}")]
    Read {
        /// Description of the read failure.
        message: String,
    },
}

impl SchedulingError {
    /// Creates a new `Read` error.
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a read failure.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}
