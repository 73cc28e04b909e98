//! Routing key, client event name and room derivation.

use clinicore_core::{ChangeEvent, ChangeOp, WatchedTable};
use clinicore_realtime::{date_room, doctor_room, patient_room, record_room};

fn table_prefix(table: WatchedTable) -> &'static str {
    match table {
        WatchedTable::Appointments => "appointment",
        WatchedTable::MedicalRecords => "medical_record",
        WatchedTable::VitalSigns => "vital_signs",
        WatchedTable::LabResults => "lab_results",
    }
}

/// Verb for the routing key; inserts use the table's domain verb.
fn verb(table: WatchedTable, op: ChangeOp) -> &'static str {
    match (table, op) {
        (WatchedTable::Appointments, ChangeOp::Insert) => "created",
        (WatchedTable::MedicalRecords, ChangeOp::Insert) => "created",
        (WatchedTable::VitalSigns, ChangeOp::Insert) => "recorded",
        (WatchedTable::LabResults, ChangeOp::Insert) => "resulted",
        (WatchedTable::MedicalRecords, ChangeOp::Update) => "changed",
        (_, ChangeOp::Update) => "updated",
        (_, ChangeOp::Delete) => "deleted",
    }
}

/// Routing key for the bus publish, e.g. `appointment.created`.
///
/// Downstream services bind patterns like `appointment.*` against these.
pub fn routing_key(event: &ChangeEvent) -> String {
    format!("{}.{}", table_prefix(event.table), verb(event.table, event.op))
}

/// Routing key for the secondary status-change publish, e.g.
/// `appointment.status`. Distinct from the generic update key so status
/// watchers do not have to sift every update.
pub fn status_routing_key(table: WatchedTable) -> String {
    format!("{}.status", table_prefix(table))
}

/// Event name pushed to live clients, e.g. `appointment_created`.
pub fn client_event_name(event: &ChangeEvent) -> String {
    format!("{}_{}", table_prefix(event.table), verb(event.table, event.op))
}

/// Event name for the status-change push, e.g. `appointment_status_changed`.
pub fn status_event_name(table: WatchedTable) -> String {
    format!("{}_status_changed", table_prefix(table))
}

/// Rooms an event is delivered to, besides the all-clients broadcast.
pub fn rooms_for(event: &ChangeEvent) -> Vec<String> {
    let mut rooms = Vec::new();
    if let Some(doctor_id) = &event.doctor_id {
        rooms.push(doctor_room(doctor_id));
    }
    if let Some(patient_id) = &event.patient_id {
        rooms.push(patient_room(patient_id));
    }
    if let Some(date) = event.date {
        rooms.push(date_room(date));
    }
    if let Some(record_id) = &event.record_id {
        rooms.push(record_room(record_id));
    }
    rooms
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_appointment_routing_keys() {
        let event = ChangeEvent::inserted(WatchedTable::Appointments, "a1");
        assert_eq!(routing_key(&event), "appointment.created");
        assert_eq!(client_event_name(&event), "appointment_created");

        let event = ChangeEvent::updated(WatchedTable::Appointments, "a1");
        assert_eq!(routing_key(&event), "appointment.updated");

        let event = ChangeEvent::deleted(WatchedTable::Appointments, "a1");
        assert_eq!(routing_key(&event), "appointment.deleted");
    }

    #[test]
    fn test_status_key_is_distinct_from_update_key() {
        let event = ChangeEvent::updated(WatchedTable::Appointments, "a1");
        assert_ne!(routing_key(&event), status_routing_key(event.table));
        assert_eq!(status_routing_key(WatchedTable::Appointments), "appointment.status");
    }

    #[test]
    fn test_status_event_name_follows_the_table() {
        assert_eq!(
            status_event_name(WatchedTable::Appointments),
            "appointment_status_changed"
        );
        assert_eq!(
            status_event_name(WatchedTable::LabResults),
            "lab_results_status_changed"
        );
    }

    #[test]
    fn test_domain_verbs_for_inserts() {
        let event = ChangeEvent::inserted(WatchedTable::VitalSigns, "v1");
        assert_eq!(routing_key(&event), "vital_signs.recorded");

        let event = ChangeEvent::inserted(WatchedTable::LabResults, "l1");
        assert_eq!(routing_key(&event), "lab_results.resulted");

        let event = ChangeEvent::updated(WatchedTable::MedicalRecords, "r1");
        assert_eq!(routing_key(&event), "medical_record.changed");
        assert_eq!(client_event_name(&event), "medical_record_changed");
    }

    #[test]
    fn test_rooms_follow_event_references() {
        let event = ChangeEvent::inserted(WatchedTable::Appointments, "a1")
            .with_doctor("d1")
            .with_patient("p1")
            .with_date(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        assert_eq!(
            rooms_for(&event),
            vec!["doctor_d1", "patient_p1", "date_2025-03-07"]
        );
    }

    #[test]
    fn test_rooms_empty_without_references() {
        let event = ChangeEvent::deleted(WatchedTable::Appointments, "a1");
        assert!(rooms_for(&event).is_empty());
    }

    #[test]
    fn test_record_room_for_medical_data() {
        let event = ChangeEvent::updated(WatchedTable::VitalSigns, "v1").with_record("r9");
        assert_eq!(rooms_for(&event), vec!["record_r9"]);
    }
}
