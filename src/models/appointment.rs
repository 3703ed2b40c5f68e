use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentStatus, AuthorType};

/// One citizen's booking of one service at one center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub center_id: Uuid,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub status: AppointmentStatus,
    pub selected_documents: Vec<SelectedDocument>,
    pub document_validation: DocumentValidation,
    pub notes: Option<String>,
    pub processing_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i64>,
}

/// A document the citizen declared they will bring, fixed at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedDocument {
    pub document_name: String,
    #[serde(default)]
    pub is_alternative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_name: Option<String>,
    pub selected_at: DateTime<Utc>,
}

impl SelectedDocument {
    /// Name staff see and match against: the alternative when one was
    /// chosen and named, the primary document otherwise.
    pub fn resolved_name(&self) -> &str {
        match (&self.alternative_name, self.is_alternative) {
            (Some(alt), true) if !alt.trim().is_empty() => alt,
            _ => &self.document_name,
        }
    }
}

/// Staff verdict on the selected documents. Overwritten, never appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentValidation {
    pub is_validated: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<Uuid>,
    pub staff_notes: Option<String>,
    /// Sorted, de-duplicated resolved document names.
    pub missing_documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentComment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub author_id: Uuid,
    pub author_type: AuthorType,
    pub content: String,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

/// Audit row written for every accepted status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub appointment_id: Uuid,
    pub from_status: AppointmentStatus,
    pub to_status: AppointmentStatus,
    pub changed_by: Uuid,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}
