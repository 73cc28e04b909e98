//! Room name conventions.

use chrono::NaiveDate;

/// Room for everyone interested in one doctor's schedule.
pub fn doctor_room(doctor_id: &str) -> String {
    format!("doctor_{doctor_id}")
}

/// Room for everyone interested in one patient.
pub fn patient_room(patient_id: &str) -> String {
    format!("patient_{patient_id}")
}

/// Room for everyone watching one calendar date.
pub fn date_room(date: NaiveDate) -> String {
    format!("date_{}", date.format("%Y-%m-%d"))
}

/// Room for everyone watching one medical record.
pub fn record_room(record_id: &str) -> String {
    format!("record_{record_id}")
}
