//! Persistence boundary for conflict detection.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinicore_core::Appointment;

use crate::error::SchedulingError;

/// Read-only view of appointments, implemented by the persistence layer.
///
/// This is the only thing the conflict detector asks of the system-of-record:
/// "appointments for doctor X on date Y". Status filtering happens in the
/// detector, so backends may return rows in any status.
#[async_trait]
pub trait AppointmentReader: Send + Sync {
    /// Fetch all appointments for the given doctor on the given date.
    async fn appointments_for_doctor_on(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError>;
}
