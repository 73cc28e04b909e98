//! Normalization of NOTIFY payloads into change events.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use clinicore_core::{ChangeEvent, ChangeOp, WatchedTable};

/// Columns compared between before/after images per table.
///
/// Only value changes on these columns are reported as `changed_fields`;
/// bookkeeping columns like `updated_at` are deliberately absent.
fn tracked_fields(table: WatchedTable) -> &'static [&'static str] {
    match table {
        WatchedTable::Appointments => &[
            "status",
            "appointment_date",
            "start_time",
            "end_time",
            "reason",
            "notes",
        ],
        WatchedTable::MedicalRecords => &["diagnosis", "treatment", "prescriptions", "notes"],
        WatchedTable::VitalSigns => &[
            "heart_rate",
            "blood_pressure",
            "temperature",
            "respiratory_rate",
            "oxygen_saturation",
        ],
        WatchedTable::LabResults => &["status", "result", "units", "reference_range"],
    }
}

/// Payload of one row-level NOTIFY.
///
/// The `old` image is absent on INSERT and the `new` image is absent on
/// DELETE; both are present on UPDATE.
#[derive(Debug, Deserialize)]
pub struct ChangeNotification {
    pub table: String,
    pub operation: String,
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default)]
    pub new: Option<Value>,
}

impl ChangeNotification {
    /// Parses the operation kind.
    pub fn op(&self) -> Option<ChangeOp> {
        match self.operation.to_uppercase().as_str() {
            "INSERT" => Some(ChangeOp::Insert),
            "UPDATE" => Some(ChangeOp::Update),
            "DELETE" => Some(ChangeOp::Delete),
            other => {
                warn!(operation = %other, "Unknown change operation");
                None
            }
        }
    }

    /// Reads a string field from the new image, falling back to the old one.
    ///
    /// The fallback is what keeps doctor/patient references on DELETE events,
    /// where only the before image exists.
    fn field(&self, name: &str) -> Option<String> {
        string_field(self.new.as_ref(), name).or_else(|| string_field(self.old.as_ref(), name))
    }

    /// Normalizes this notification into a [`ChangeEvent`] for the given
    /// table, or `None` when the payload is unusable (no row id).
    pub fn normalize(&self, table: WatchedTable) -> Option<ChangeEvent> {
        let op = self.op()?;

        let entity_id = self.field("id").or_else(|| {
            warn!(table = %table, "Change notification without row id, dropping");
            None
        })?;

        let mut event = ChangeEvent::new(op, table, entity_id.clone())
            .with_status_change(
                string_field(self.old.as_ref(), "status"),
                string_field(self.new.as_ref(), "status"),
            );
        event.doctor_id = self.field("doctor_id");
        event.patient_id = self.field("patient_id");
        event.record_id = match table {
            // The medical record itself is the room subject.
            WatchedTable::MedicalRecords => Some(entity_id),
            _ => self.field("record_id"),
        };
        event.date = self
            .field("appointment_date")
            .or_else(|| self.field("date"))
            .and_then(|s| parse_date(&s));
        event.start_time = self.field("start_time").and_then(|s| parse_time(&s));
        event.end_time = self.field("end_time").and_then(|s| parse_time(&s));

        if op == ChangeOp::Update {
            event.changed_fields = self.changed_fields(table);
        }

        Some(event)
    }

    /// Computes which tracked columns differ between the row images.
    fn changed_fields(&self, table: WatchedTable) -> Vec<String> {
        let (Some(old), Some(new)) = (self.old.as_ref(), self.new.as_ref()) else {
            return Vec::new();
        };
        tracked_fields(table)
            .iter()
            .filter(|field| old.get(**field) != new.get(**field))
            .map(|field| (*field).to_string())
            .collect()
    }
}

fn string_field(image: Option<&Value>, name: &str) -> Option<String> {
    let value = image?.get(name)?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(operation: &str, old: Option<Value>, new: Option<Value>) -> ChangeNotification {
        ChangeNotification {
            table: "appointments".to_string(),
            operation: operation.to_string(),
            old,
            new,
        }
    }

    #[test]
    fn test_insert_normalization() {
        let n = notification(
            "INSERT",
            None,
            Some(json!({
                "id": "a1",
                "doctor_id": "d1",
                "patient_id": "p1",
                "appointment_date": "2025-03-14",
                "start_time": "09:00:00",
                "end_time": "09:30:00",
                "status": "scheduled"
            })),
        );

        let event = n.normalize(WatchedTable::Appointments).unwrap();
        assert_eq!(event.op, ChangeOp::Insert);
        assert_eq!(event.entity_id, "a1");
        assert_eq!(event.doctor_id.as_deref(), Some("d1"));
        assert_eq!(event.patient_id.as_deref(), Some("p1"));
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 3, 14));
        assert_eq!(event.start_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(event.new_status.as_deref(), Some("scheduled"));
        assert!(event.old_status.is_none());
        assert!(event.changed_fields.is_empty());
    }

    #[test]
    fn test_delete_keeps_ids_from_old_image() {
        let n = notification(
            "DELETE",
            Some(json!({
                "id": "a2",
                "doctor_id": "d7",
                "patient_id": "p9",
                "status": "scheduled"
            })),
            None,
        );

        let event = n.normalize(WatchedTable::Appointments).unwrap();
        assert_eq!(event.op, ChangeOp::Delete);
        assert_eq!(event.entity_id, "a2");
        assert_eq!(event.doctor_id.as_deref(), Some("d7"));
        assert_eq!(event.patient_id.as_deref(), Some("p9"));
    }

    #[test]
    fn test_status_change_update() {
        let n = notification(
            "UPDATE",
            Some(json!({"id": "a3", "status": "scheduled"})),
            Some(json!({"id": "a3", "status": "cancelled"})),
        );

        let event = n.normalize(WatchedTable::Appointments).unwrap();
        assert!(event.is_status_change());
        assert_eq!(event.status_transition(), Some(("scheduled", "cancelled")));
        assert_eq!(event.changed_fields, vec!["status".to_string()]);
    }

    #[test]
    fn test_changed_fields_by_value_inequality() {
        let n = ChangeNotification {
            table: "medical_records".to_string(),
            operation: "UPDATE".to_string(),
            old: Some(json!({
                "id": "r1",
                "patient_id": "p1",
                "diagnosis": "flu",
                "treatment": "rest",
                "notes": "n"
            })),
            new: Some(json!({
                "id": "r1",
                "patient_id": "p1",
                "diagnosis": "pneumonia",
                "treatment": "rest",
                "notes": "n"
            })),
        };

        let event = n.normalize(WatchedTable::MedicalRecords).unwrap();
        assert_eq!(event.changed_fields, vec!["diagnosis".to_string()]);
        assert!(event.field_changed("diagnosis"));
        assert!(!event.field_changed("treatment"));
        // The record itself is the room subject.
        assert_eq!(event.record_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_vital_signs_reference_their_record() {
        let n = ChangeNotification {
            table: "vital_signs".to_string(),
            operation: "INSERT".to_string(),
            old: None,
            new: Some(json!({
                "id": "v1",
                "record_id": "r5",
                "patient_id": "p2",
                "heart_rate": 72
            })),
        };

        let event = n.normalize(WatchedTable::VitalSigns).unwrap();
        assert_eq!(event.record_id.as_deref(), Some("r5"));
        assert_eq!(event.patient_id.as_deref(), Some("p2"));
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let n = notification("INSERT", None, Some(json!({"id": 42, "doctor_id": 7})));
        let event = n.normalize(WatchedTable::Appointments).unwrap();
        assert_eq!(event.entity_id, "42");
        assert_eq!(event.doctor_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_payload_without_id_is_dropped() {
        let n = notification("INSERT", None, Some(json!({"doctor_id": "d1"})));
        assert!(n.normalize(WatchedTable::Appointments).is_none());
    }

    #[test]
    fn test_unknown_operation_is_dropped() {
        let n = notification("TRUNCATE", None, Some(json!({"id": "a1"})));
        assert!(n.normalize(WatchedTable::Appointments).is_none());
    }
}
