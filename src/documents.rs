//! Document validation for appointments.
//!
//! Missing documents are matched by resolved display name: the alternative
//! name when the citizen picked an alternative, the primary name otherwise.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::appointment::{load_visible, WorkflowError};
use crate::authorization::Principal;
use crate::db;
use crate::models::enums::Permission;
use crate::models::{DocumentValidation, Notification};
use crate::notifications::{self, MissingDocumentsEvent, NotificationEvent};

/// Either permission lets staff work on appointment documents.
const DOCUMENT_PERMISSIONS: &[Permission] = &[Permission::UpdateStatus, Permission::UploadDocuments];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationInput {
    pub is_validated: bool,
    #[serde(default)]
    pub missing_documents: Vec<String>,
    #[serde(default)]
    pub staff_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDocumentsRequest {
    #[serde(default)]
    pub missing_documents: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Trimmed, non-empty, sorted and de-duplicated.
fn normalize(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Overwrite the appointment's validation record.
///
/// Re-submitting an identical verdict from the same staff member leaves
/// the stored record (including `validated_at`) untouched.
pub fn record_validation(
    conn: &Connection,
    principal: &Principal,
    appointment_id: &Uuid,
    input: &ValidationInput,
    now: DateTime<Utc>,
) -> Result<DocumentValidation, WorkflowError> {
    principal.require_any(DOCUMENT_PERMISSIONS)?;
    let appt = load_visible(conn, principal, appointment_id)?;

    let selected: BTreeSet<&str> = appt
        .selected_documents
        .iter()
        .map(|d| d.resolved_name())
        .collect();
    let missing_documents = normalize(&input.missing_documents);
    if let Some(unknown) = missing_documents.iter().find(|m| !selected.contains(m.as_str())) {
        return Err(WorkflowError::Validation(format!(
            "'{unknown}' is not one of the documents selected for this appointment"
        )));
    }

    let staff_notes = input
        .staff_notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    let current = &appt.document_validation;
    if current.validated_at.is_some()
        && current.is_validated == input.is_validated
        && current.missing_documents == missing_documents
        && current.staff_notes == staff_notes
        && current.validated_by == Some(principal.user_id)
    {
        return Ok(current.clone());
    }

    let validation = DocumentValidation {
        is_validated: input.is_validated,
        validated_at: Some(now),
        validated_by: Some(principal.user_id),
        staff_notes,
        missing_documents,
    };
    db::update_document_validation(conn, &appt.id, &validation)?;
    tracing::info!(
        appointment_id = %appt.id,
        is_validated = validation.is_validated,
        missing = validation.missing_documents.len(),
        "Document validation recorded"
    );
    Ok(validation)
}

/// Send the citizen one notification listing what they still need to
/// bring. The appointment itself is not modified.
pub fn notify_missing_documents(
    conn: &Connection,
    principal: &Principal,
    appointment_id: &Uuid,
    req: &MissingDocumentsRequest,
    now: DateTime<Utc>,
) -> Result<Notification, WorkflowError> {
    principal.require_any(DOCUMENT_PERMISSIONS)?;

    let missing_documents = normalize(&req.missing_documents);
    if missing_documents.is_empty() {
        return Err(WorkflowError::Validation(
            "At least one missing document is required".into(),
        ));
    }
    let appt = load_visible(conn, principal, appointment_id)?;

    let event = NotificationEvent::MissingDocuments(MissingDocumentsEvent {
        appointment_id: appt.id,
        citizen_id: appt.user_id,
        missing_documents,
        alternatives: normalize(&req.alternatives),
        message: req.message.clone(),
        actor: principal.user_id,
        timestamp: now,
    });
    let mut created = notifications::record(conn, &event)?;
    tracing::info!(appointment_id = %appt.id, "Missing-documents notice recorded");
    created
        .pop()
        .ok_or_else(|| WorkflowError::Validation("Nothing to notify".into()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::authorization::AuthError;
    use crate::db::open_memory_database;
    use crate::models::enums::{AppointmentStatus, NotificationType, Role};
    use crate::test_support::{self, seed};

    fn input(is_validated: bool, missing: &[&str], notes: Option<&str>) -> ValidationInput {
        ValidationInput {
            is_validated,
            missing_documents: missing.iter().map(|s| s.to_string()).collect(),
            staff_notes: notes.map(String::from),
        }
    }

    #[test]
    fn validation_matches_resolved_names() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let staff = test_support::principal(&conn, &fx.staff_user);

        let record = record_validation(
            &conn,
            &staff,
            &appt.id,
            &input(false, &["Electricity Bill", " Aadhaar Card", "Aadhaar Card"], Some("Blurred copy")),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.missing_documents, vec!["Aadhaar Card", "Electricity Bill"]);
        assert_eq!(record.validated_by, Some(fx.staff_user.id));

        // The primary name of an alternative selection is not a selected document.
        let err = record_validation(&conn, &staff, &appt.id, &input(false, &["Ration Card"], None), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let stored = db::get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.document_validation, record);
    }

    #[test]
    fn identical_validation_is_idempotent() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let staff = test_support::principal(&conn, &fx.staff_user);
        let verdict = input(true, &[], Some("All originals verified"));

        let first = record_validation(&conn, &staff, &appt.id, &verdict, Utc::now()).unwrap();
        let second =
            record_validation(&conn, &staff, &appt.id, &verdict, Utc::now() + Duration::minutes(3)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            db::get_appointment(&conn, &appt.id).unwrap().unwrap().document_validation,
            first
        );

        let changed = record_validation(&conn, &staff, &appt.id, &input(false, &["Aadhaar Card"], None), Utc::now())
            .unwrap();
        assert!(!changed.is_validated);
        assert_eq!(changed.staff_notes, None);
    }

    #[test]
    fn validation_does_not_touch_status_or_selection() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::appointment_on(
            &conn,
            &fx,
            fx.center.id,
            test_support::today(),
            AppointmentStatus::Confirmed,
        );
        let staff = test_support::principal(&conn, &fx.staff_user);
        record_validation(&conn, &staff, &appt.id, &input(true, &[], None), Utc::now()).unwrap();

        let stored = db::get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Confirmed);
        assert_eq!(stored.selected_documents, appt.selected_documents);
    }

    #[test]
    fn upload_documents_permission_is_enough() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);

        let uploader = test_support::user(&conn, "Document Desk", Role::Staff);
        test_support::staff_at(&conn, &uploader, &fx.center, &[Permission::UploadDocuments]);
        let uploader = test_support::principal(&conn, &uploader);
        assert!(record_validation(&conn, &uploader, &appt.id, &input(true, &[], None), Utc::now()).is_ok());

        let commenter = test_support::user(&conn, "Help Desk", Role::Staff);
        test_support::staff_at(&conn, &commenter, &fx.center, &[Permission::AddComments]);
        let commenter = test_support::principal(&conn, &commenter);
        assert!(matches!(
            record_validation(&conn, &commenter, &appt.id, &input(true, &[], None), Utc::now()),
            Err(WorkflowError::Auth(AuthError::Forbidden(_)))
        ));
    }

    #[test]
    fn empty_missing_list_is_rejected() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let staff = test_support::principal(&conn, &fx.staff_user);

        let req = MissingDocumentsRequest {
            missing_documents: vec!["  ".into()],
            ..Default::default()
        };
        assert!(matches!(
            notify_missing_documents(&conn, &staff, &appt.id, &req, Utc::now()),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(db::count_unread(&conn, &fx.citizen.id).unwrap(), 0);
    }

    #[test]
    fn missing_documents_produce_exactly_one_notification() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let staff = test_support::principal(&conn, &fx.staff_user);

        let req = MissingDocumentsRequest {
            missing_documents: vec!["Aadhaar Card".into()],
            alternatives: vec!["Voter ID".into()],
            message: Some("Originals please.".into()),
        };
        let n = notify_missing_documents(&conn, &staff, &appt.id, &req, Utc::now()).unwrap();
        assert_eq!(n.recipient_id, fx.citizen.id);
        assert_eq!(n.notification_type, NotificationType::Appointment);
        assert!(n.message.contains("Aadhaar Card"));
        assert!(n.message.contains("Voter ID"));
        assert!(n.message.ends_with("Originals please."));

        let inbox = notifications::inbox(&conn, &fx.citizen.id).unwrap();
        assert_eq!(inbox.notifications.len(), 1);

        let stored = db::get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
        assert_eq!(stored.document_validation, DocumentValidation::default());
    }
}
