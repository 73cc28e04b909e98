//! Change events derived from row-level change notifications.
//!
//! A [`ChangeEvent`] is the normalized form of one insert/update/delete
//! notification from the system-of-record. It is transient: created by the
//! change-feed listener, consumed once by the event router, then discarded.
//! Durability, if any, lives in the downstream bus, never in this object.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    /// Returns the string representation of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "insert",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tables this core watches for changes.
///
/// Each table gets its own change-feed subscription and its own
/// normalization rules; the router merges them downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedTable {
    Appointments,
    MedicalRecords,
    VitalSigns,
    LabResults,
}

impl WatchedTable {
    /// The table name as it appears in the database and NOTIFY payloads.
    pub fn table_name(&self) -> &'static str {
        match self {
            WatchedTable::Appointments => "appointments",
            WatchedTable::MedicalRecords => "medical_records",
            WatchedTable::VitalSigns => "vital_signs",
            WatchedTable::LabResults => "lab_results",
        }
    }

    /// Resolves a table name from a NOTIFY payload.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "appointments" => Some(WatchedTable::Appointments),
            "medical_records" => Some(WatchedTable::MedicalRecords),
            "vital_signs" => Some(WatchedTable::VitalSigns),
            "lab_results" => Some(WatchedTable::LabResults),
            _ => None,
        }
    }
}

impl std::fmt::Display for WatchedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// A normalized change notification.
///
/// Cross-reference ids are best-effort: taken from the new row image,
/// falling back to the old image so DELETE events still carry the subject's
/// prior doctor/patient ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Kind of change (insert, update, delete).
    pub op: ChangeOp,
    /// Table the change occurred on.
    pub table: WatchedTable,
    /// Identifier of the changed row.
    pub entity_id: String,
    /// Doctor referenced by the row, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    /// Patient referenced by the row, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Medical record referenced by the row, for record-scoped tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Calendar date carried by the row, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    /// Status before the change (UPDATE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    /// Status after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    /// Fields whose values differ between the before and after images
    /// (UPDATE only, per-table field list).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    /// When this event object was generated.
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a new change event with the given operation and subject.
    pub fn new(op: ChangeOp, table: WatchedTable, entity_id: impl Into<String>) -> Self {
        Self {
            op,
            table,
            entity_id: entity_id.into(),
            doctor_id: None,
            patient_id: None,
            record_id: None,
            date: None,
            start_time: None,
            end_time: None,
            old_status: None,
            new_status: None,
            changed_fields: Vec::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Create an insert event.
    pub fn inserted(table: WatchedTable, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeOp::Insert, table, entity_id)
    }

    /// Create an update event.
    pub fn updated(table: WatchedTable, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeOp::Update, table, entity_id)
    }

    /// Create a delete event.
    pub fn deleted(table: WatchedTable, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeOp::Delete, table, entity_id)
    }

    /// Set the doctor reference.
    pub fn with_doctor(mut self, doctor_id: impl Into<String>) -> Self {
        self.doctor_id = Some(doctor_id.into());
        self
    }

    /// Set the patient reference.
    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Set the medical record reference.
    pub fn with_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// Set the calendar date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the time interval.
    pub fn with_times(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set the before/after status pair.
    pub fn with_status_change(
        mut self,
        old: Option<impl Into<String>>,
        new: Option<impl Into<String>>,
    ) -> Self {
        self.old_status = old.map(Into::into);
        self.new_status = new.map(Into::into);
        self
    }

    /// Set the changed-field list.
    pub fn with_changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = fields;
        self
    }

    /// Whether the status value actually changed between the row images.
    pub fn is_status_change(&self) -> bool {
        self.op == ChangeOp::Update
            && self.old_status.is_some()
            && self.old_status != self.new_status
    }

    /// The before/after status pair, when this is a status change.
    pub fn status_transition(&self) -> Option<(&str, &str)> {
        if !self.is_status_change() {
            return None;
        }
        match (self.old_status.as_deref(), self.new_status.as_deref()) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    /// Whether a given field changed in this event.
    pub fn field_changed(&self, field: &str) -> bool {
        self.changed_fields.iter().any(|f| f == field)
    }
}
