//! Conflict detection over a doctor's calendar.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use clinicore_core::Appointment;

use crate::error::SchedulingError;
use crate::interval::intervals_overlap;
use crate::reader::AppointmentReader;

/// Result of a conflict check.
///
/// When `has_conflict` is true, `conflicts` holds every overlapping
/// appointment so the caller can offer alternatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResult {
    pub has_conflict: bool,
    pub conflicts: Vec<Appointment>,
}

impl ConflictResult {
    /// A result with no conflicts.
    #[must_use]
    pub fn none() -> Self {
        Self {
            has_conflict: false,
            conflicts: Vec::new(),
        }
    }

    /// A result carrying the given conflicting appointments.
    #[must_use]
    pub fn found(conflicts: Vec<Appointment>) -> Self {
        Self {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Detects overlaps between a candidate booking and a doctor's existing
/// active appointments.
///
/// Note: the check and the eventual write are not one transaction. Two
/// concurrent requests for the same slot can both pass the check and both
/// write; closing that race belongs to the persistence layer, ideally via an
/// exclusion constraint on (doctor, date, interval).
pub struct ConflictDetector<R> {
    reader: R,
}

impl<R: AppointmentReader> ConflictDetector<R> {
    /// Create a detector over the given appointment reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Check a candidate interval against the doctor's calendar.
    ///
    /// Only active appointments (scheduled, confirmed, in progress) can
    /// conflict. `exclude_id` removes one appointment from the comparison
    /// set, which a reschedule-in-place needs to avoid conflicting with
    /// itself; without it, an identical interval is reported as a conflict.
    ///
    /// A read failure propagates verbatim. Conflict status is then unknown
    /// and the caller must not proceed with the booking.
    pub async fn check(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_id: Option<&str>,
    ) -> Result<ConflictResult, SchedulingError> {
        if start_time >= end_time {
            return Err(SchedulingError::InvalidInterval {
                start: start_time,
                end: end_time,
            });
        }

        let existing = self
            .reader
            .appointments_for_doctor_on(doctor_id, date)
            .await?;

        let conflicts: Vec<Appointment> = existing
            .into_iter()
            .filter(|appt| appt.is_active())
            .filter(|appt| exclude_id != Some(appt.id.as_str()))
            .filter(|appt| {
                intervals_overlap(appt.start_time, appt.end_time, start_time, end_time)
            })
            .collect();

        debug!(
            doctor_id = %doctor_id,
            date = %date,
            start = %start_time,
            end = %end_time,
            conflicts = conflicts.len(),
            "Conflict check completed"
        );

        Ok(ConflictResult::found(conflicts))
    }
}

impl<R> std::fmt::Debug for ConflictDetector<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use clinicore_core::{AppointmentStatus, AppointmentType};

    struct FixedReader {
        appointments: Vec<Appointment>,
    }

    #[async_trait]
    impl AppointmentReader for FixedReader {
        async fn appointments_for_doctor_on(
            &self,
            doctor_id: &str,
            date: NaiveDate,
        ) -> Result<Vec<Appointment>, SchedulingError> {
            Ok(self
                .appointments
                .iter()
                .filter(|a| a.doctor_id == doctor_id && a.date == date)
                .cloned()
                .collect())
        }
    }

    struct FailingReader;

    #[async_trait]
    impl AppointmentReader for FailingReader {
        async fn appointments_for_doctor_on(
            &self,
            _doctor_id: &str,
            _date: NaiveDate,
        ) -> Result<Vec<Appointment>, SchedulingError> {
            Err(SchedulingError::read("connection reset"))
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn appointment(id: &str, start: NaiveTime, end: NaiveTime, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: id.to_string(),
            patient_id: "p1".to_string(),
            doctor_id: "d1".to_string(),
            date: date(),
            start_time: start,
            end_time: end,
            appointment_type: AppointmentType::Consultation,
            status,
            reason: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn detector_with(appointments: Vec<Appointment>) -> ConflictDetector<FixedReader> {
        ConflictDetector::new(FixedReader { appointments })
    }

    #[tokio::test]
    async fn test_empty_calendar_has_no_conflict() {
        let detector = detector_with(vec![]);
        let result = detector
            .check("d1", date(), t(9, 0), t(9, 30), None)
            .await
            .unwrap();
        assert!(!result.has_conflict);
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_booking_conflicts() {
        let detector = detector_with(vec![appointment(
            "a1",
            t(9, 0),
            t(9, 30),
            AppointmentStatus::Scheduled,
        )]);

        let result = detector
            .check("d1", date(), t(9, 15), t(9, 45), None)
            .await
            .unwrap();
        assert!(result.has_conflict);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].id, "a1");
    }

    #[tokio::test]
    async fn test_back_to_back_booking_does_not_conflict() {
        let detector = detector_with(vec![appointment(
            "a1",
            t(9, 0),
            t(9, 30),
            AppointmentStatus::Scheduled,
        )]);

        let result = detector
            .check("d1", date(), t(9, 30), t(10, 0), None)
            .await
            .unwrap();
        assert!(!result.has_conflict);
    }

    #[tokio::test]
    async fn test_reschedule_excluding_own_id() {
        let detector = detector_with(vec![appointment(
            "a1",
            t(9, 0),
            t(9, 30),
            AppointmentStatus::Confirmed,
        )]);

        // Extending the same booking in place must not conflict with itself.
        let result = detector
            .check("d1", date(), t(9, 0), t(9, 45), Some("a1"))
            .await
            .unwrap();
        assert!(!result.has_conflict);

        // Without the exclusion, the identical window is a conflict.
        let result = detector
            .check("d1", date(), t(9, 0), t(9, 30), None)
            .await
            .unwrap();
        assert!(result.has_conflict);
    }

    #[tokio::test]
    async fn test_inactive_statuses_never_conflict() {
        let detector = detector_with(vec![
            appointment("a1", t(9, 0), t(10, 0), AppointmentStatus::Cancelled),
            appointment("a2", t(9, 0), t(10, 0), AppointmentStatus::Completed),
            appointment("a3", t(9, 0), t(10, 0), AppointmentStatus::NoShow),
        ]);

        let result = detector
            .check("d1", date(), t(9, 0), t(10, 0), None)
            .await
            .unwrap();
        assert!(!result.has_conflict);
    }

    #[tokio::test]
    async fn test_all_overlaps_are_returned() {
        let detector = detector_with(vec![
            appointment("a1", t(9, 0), t(9, 30), AppointmentStatus::Scheduled),
            appointment("a2", t(9, 20), t(9, 50), AppointmentStatus::InProgress),
            appointment("a3", t(11, 0), t(11, 30), AppointmentStatus::Scheduled),
        ]);

        let result = detector
            .check("d1", date(), t(9, 15), t(9, 45), None)
            .await
            .unwrap();
        assert!(result.has_conflict);
        let ids: Vec<&str> = result.conflicts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_inverted_interval_is_rejected() {
        let detector = detector_with(vec![]);
        let err = detector
            .check("d1", date(), t(10, 0), t(9, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidInterval { .. }));
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let detector = ConflictDetector::new(FailingReader);
        let err = detector
            .check("d1", date(), t(9, 0), t(9, 30), None)
            .await
            .unwrap_err();
        assert!(err.is_read());
    }
}
