//! Appointment lifecycle: booking, the status state machine, comments and
//! scoped reads.
//!
//! ```text
//! pending ──► confirmed ──► in_progress ──► completed
//!    │            │              │
//!    └────────────┴──────────────┴────────► cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. A transition is checked
//! against the persisted status inside an IMMEDIATE transaction and
//! written with a conditional update, so two concurrent writers cannot
//! both move the same appointment out of the same state.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc, Weekday};
use regex::Regex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{AuthError, Principal};
use crate::dashboard::DateRange;
use crate::db::{self, AppointmentFilter, DatabaseError, StatusUpdate};
use crate::models::enums::{AppointmentStatus, AuthorType, Permission, Role};
use crate::models::*;
use crate::notifications::{self, BookedEvent, NotificationEvent, TransitionEvent};

/// Default and maximum page sizes for staff listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

static TIME_SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(1[0-2]|0?[1-9]):([0-5][0-9]) (AM|PM)$").unwrap()
});

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors surfaced by appointment, document and dashboard workflows.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    NotFound(String),
    #[error("Cannot change status from {from} to {to}")]
    IllegalTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for WorkflowError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                WorkflowError::NotFound(format!("{entity_type} not found"))
            }
            other => WorkflowError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(err: rusqlite::Error) -> Self {
        WorkflowError::Database(DatabaseError::Sqlite(err))
    }
}

fn appointment_not_found() -> WorkflowError {
    WorkflowError::NotFound("Appointment not found".into())
}

// ═══════════════════════════════════════════════════════════
// Transition table
// ═══════════════════════════════════════════════════════════

/// Statuses reachable in one step from `status`.
pub fn allowed_next(status: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;
    match status {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[InProgress, Cancelled],
        InProgress => &[Completed, Cancelled],
        Completed | Cancelled => &[],
    }
}

pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    allowed_next(from).contains(&to)
}

pub fn is_terminal(status: AppointmentStatus) -> bool {
    allowed_next(status).is_empty()
}

/// Minutes after midnight for an "H:MM AM|PM" slot label.
pub fn slot_minutes(slot: &str) -> Option<u32> {
    let caps = TIME_SLOT.captures(slot.trim())?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let hour24 = match (&caps[3], hour) {
        ("AM", 12) => 0,
        ("AM", h) => h,
        ("PM", 12) => 12,
        (_, h) => h + 12,
    };
    Some(hour24 * 60 + minute)
}

// ═══════════════════════════════════════════════════════════
// Scoped loading
// ═══════════════════════════════════════════════════════════

/// Load an appointment the principal may see. Anything outside the
/// caller's scope (other center, other citizen) reads as not found.
pub(crate) fn load_visible(
    conn: &Connection,
    principal: &Principal,
    id: &Uuid,
) -> Result<Appointment, WorkflowError> {
    let appt = db::get_appointment(conn, id)?.ok_or_else(appointment_not_found)?;
    let visible = if principal.is_staff() {
        principal.can_access_center(&appt.center_id)
    } else {
        appt.user_id == principal.user_id
    };
    if visible {
        Ok(appt)
    } else {
        Err(appointment_not_found())
    }
}

// ═══════════════════════════════════════════════════════════
// Transition
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub appointment_id: Uuid,
    pub target: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Status the caller believes is current; a mismatch is rejected.
    pub expected_status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub appointment: Appointment,
    pub event: TransitionEvent,
    pub notifications: Vec<Notification>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Move an appointment along one edge of the transition table.
///
/// Status write, history row and citizen notification commit together.
/// External delivery of the returned notifications is the caller's job.
pub fn transition(
    conn: &mut Connection,
    principal: &Principal,
    req: &TransitionRequest,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    principal.require(Permission::UpdateStatus)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = load_visible(&tx, principal, &req.appointment_id)?;
    let from = current.status;

    if req.expected_status.is_some_and(|expected| expected != from)
        || !can_transition(from, req.target)
    {
        return Err(WorkflowError::IllegalTransition { from, to: req.target });
    }

    let reason = non_blank(req.reason.as_deref());
    if req.target == AppointmentStatus::Cancelled && reason.is_none() {
        return Err(WorkflowError::Validation(
            "A reason is required to cancel an appointment".into(),
        ));
    }

    let (event, notifications) = apply_transition(
        &tx,
        principal,
        &current,
        req.target,
        reason,
        non_blank(req.notes.as_deref()),
        now,
    )?;
    tx.commit()?;

    tracing::info!(
        appointment_id = %current.id,
        from = %from,
        to = %req.target,
        actor = %principal.user_id,
        "Appointment status changed"
    );
    finish(conn, event, notifications)
}

/// Hour of the appointment day after which a citizen can no longer cancel.
pub const CANCEL_CUTOFF_HOUR: u32 = 9;

/// Default history reason when a citizen cancels without giving one.
const CITIZEN_CANCEL_REASON: &str = "Cancelled by citizen";

/// Citizen cancels their own `pending` or `confirmed` booking.
///
/// Allowed until 9:00 AM (local time) on the appointment day. Goes
/// through the same conditional update, history and notification path as
/// staff transitions.
pub fn cancel_own(
    conn: &mut Connection,
    principal: &Principal,
    appointment_id: &Uuid,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    if principal.role != Role::User {
        return Err(AuthError::Forbidden("citizen account".into()).into());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = load_visible(&tx, principal, appointment_id)?;
    let from = current.status;
    if !matches!(from, AppointmentStatus::Pending | AppointmentStatus::Confirmed) {
        return Err(WorkflowError::IllegalTransition {
            from,
            to: AppointmentStatus::Cancelled,
        });
    }

    let local_now = now.with_timezone(&Local).naive_local();
    let past_cutoff = current
        .appointment_date
        .and_hms_opt(CANCEL_CUTOFF_HOUR, 0, 0)
        .is_some_and(|cutoff| local_now >= cutoff);
    if past_cutoff {
        return Err(WorkflowError::Validation(
            "Appointments cannot be cancelled after 9:00 AM on the appointment day. \
             Please contact the center staff."
                .into(),
        ));
    }

    let reason = non_blank(reason).unwrap_or_else(|| CITIZEN_CANCEL_REASON.into());
    let (event, notifications) = apply_transition(
        &tx,
        principal,
        &current,
        AppointmentStatus::Cancelled,
        Some(reason),
        None,
        now,
    )?;
    tx.commit()?;

    tracing::info!(
        appointment_id = %current.id,
        from = %from,
        citizen = %principal.user_id,
        "Appointment cancelled by citizen"
    );
    finish(conn, event, notifications)
}

/// Conditional status write, history row and inbox records, all on `tx`.
/// The caller has already validated the edge.
fn apply_transition(
    tx: &Transaction<'_>,
    principal: &Principal,
    current: &Appointment,
    target: AppointmentStatus,
    reason: Option<String>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(TransitionEvent, Vec<Notification>), WorkflowError> {
    let from = current.status;
    let completed_at = (target == AppointmentStatus::Completed).then_some(now);
    let actual_duration_minutes = match completed_at {
        Some(done) => db::started_at(tx, &current.id)?
            .map(|start| (done - start).num_minutes().max(0)),
        None => None,
    };

    let changed = db::update_status_if(
        tx,
        &current.id,
        from,
        &StatusUpdate {
            to: target,
            completed_at,
            actual_duration_minutes,
            processing_notes: notes.as_deref(),
        },
    )?;
    if changed == 0 {
        return Err(WorkflowError::IllegalTransition { from, to: target });
    }

    db::insert_status_history(
        tx,
        &StatusHistoryEntry {
            appointment_id: current.id,
            from_status: from,
            to_status: target,
            changed_by: principal.user_id,
            reason: reason.clone(),
            notes,
            changed_at: now,
        },
    )?;

    let event = TransitionEvent {
        appointment_id: current.id,
        citizen_id: current.user_id,
        from_status: from,
        to_status: target,
        actor: principal.user_id,
        reason,
        appointment_date: current.appointment_date,
        time_slot: current.time_slot.clone(),
        timestamp: now,
    };
    let notifications = notifications::record(tx, &NotificationEvent::Transition(event.clone()))?;
    Ok((event, notifications))
}

fn finish(
    conn: &Connection,
    event: TransitionEvent,
    notifications: Vec<Notification>,
) -> Result<TransitionOutcome, WorkflowError> {
    let appointment =
        db::get_appointment(conn, &event.appointment_id)?.ok_or_else(appointment_not_found)?;
    Ok(TransitionOutcome {
        appointment,
        event,
        notifications,
    })
}

// ═══════════════════════════════════════════════════════════
// Booking
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSelection {
    pub document_name: String,
    #[serde(default)]
    pub is_alternative: bool,
    #[serde(default)]
    pub alternative_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub service_id: Uuid,
    pub center_id: Uuid,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    #[serde(default)]
    pub selected_documents: Vec<DocumentSelection>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub notifications: Vec<Notification>,
}

/// Bookable slot starts, in minutes after midnight: 9:00 AM up to 5:00 PM.
const OPENING_HOURS: std::ops::Range<u32> = 9 * 60..17 * 60;

/// Why centers are closed on `date`, if they are. Sundays and the second
/// Saturday of the month are holidays.
pub fn closed_reason(date: NaiveDate) -> Option<&'static str> {
    match date.weekday() {
        Weekday::Sun => Some("Bookings are not available on Sundays"),
        Weekday::Sat if (8..=14).contains(&date.day()) => {
            Some("Bookings are not available on second Saturdays")
        }
        _ => None,
    }
}

/// Create a `pending` appointment for the calling citizen.
pub fn book_appointment(
    conn: &mut Connection,
    principal: &Principal,
    req: &BookingRequest,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<BookingOutcome, WorkflowError> {
    if principal.role != Role::User {
        return Err(AuthError::Forbidden("citizen account".into()).into());
    }
    if req.appointment_date < today {
        return Err(WorkflowError::Validation(
            "Appointment date cannot be in the past".into(),
        ));
    }
    let time_slot = req.time_slot.trim();
    let Some(minutes) = slot_minutes(time_slot) else {
        return Err(WorkflowError::Validation(format!(
            "Invalid time slot '{time_slot}', expected e.g. \"10:00 AM\""
        )));
    };
    if !OPENING_HOURS.contains(&minutes) {
        return Err(WorkflowError::Validation(
            "Appointments can only be booked between 9:00 AM and 5:00 PM".into(),
        ));
    }
    if let Some(reason) = closed_reason(req.appointment_date) {
        return Err(WorkflowError::Validation(reason.into()));
    }

    let mut selected_documents = Vec::with_capacity(req.selected_documents.len());
    for doc in &req.selected_documents {
        let document_name = doc.document_name.trim();
        if document_name.is_empty() {
            return Err(WorkflowError::Validation("Document names cannot be empty".into()));
        }
        let alternative_name = non_blank(doc.alternative_name.as_deref());
        selected_documents.push(SelectedDocument {
            document_name: document_name.into(),
            is_alternative: doc.is_alternative && alternative_name.is_some(),
            alternative_name,
            selected_at: now,
        });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let service = db::get_service(&tx, &req.service_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| WorkflowError::NotFound("Service not found".into()))?;
    db::get_center(&tx, &req.center_id)?
        .filter(|c| c.is_active)
        .ok_or_else(|| WorkflowError::NotFound("Center not found".into()))?;
    if db::slot_taken(&tx, &req.center_id, req.appointment_date, time_slot)? {
        return Err(WorkflowError::Validation("This time slot is already booked".into()));
    }

    let appointment = Appointment {
        id: Uuid::new_v4(),
        user_id: principal.user_id,
        service_id: service.id,
        center_id: req.center_id,
        appointment_date: req.appointment_date,
        time_slot: time_slot.into(),
        status: AppointmentStatus::Pending,
        selected_documents,
        document_validation: DocumentValidation::default(),
        notes: non_blank(req.notes.as_deref()),
        processing_notes: None,
        created_at: now,
        completed_at: None,
        actual_duration_minutes: None,
    };
    db::insert_appointment(&tx, &appointment)?;

    let notifications = notifications::record(
        &tx,
        &NotificationEvent::Booked(BookedEvent {
            appointment_id: appointment.id,
            citizen_id: appointment.user_id,
            center_id: appointment.center_id,
            service_name: service.name,
            appointment_date: appointment.appointment_date,
            time_slot: appointment.time_slot.clone(),
            timestamp: now,
        }),
    )?;
    tx.commit()?;

    tracing::info!(appointment_id = %appointment.id, center_id = %appointment.center_id, "Appointment booked");
    Ok(BookingOutcome {
        appointment,
        notifications,
    })
}

// ═══════════════════════════════════════════════════════════
// Comments
// ═══════════════════════════════════════════════════════════

/// Append a comment. Staff need `add_comments`; citizens may only comment
/// on their own appointments.
pub fn add_comment(
    conn: &Connection,
    principal: &Principal,
    appointment_id: &Uuid,
    content: &str,
    is_visible: bool,
    now: DateTime<Utc>,
) -> Result<AppointmentComment, WorkflowError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(WorkflowError::Validation("Comment cannot be empty".into()));
    }

    let author_type = if principal.is_staff() {
        principal.require(Permission::AddComments)?;
        AuthorType::Staff
    } else {
        AuthorType::User
    };
    let appt = load_visible(conn, principal, appointment_id)?;

    let comment = AppointmentComment {
        id: Uuid::new_v4(),
        appointment_id: appt.id,
        author_id: principal.user_id,
        author_type,
        content: content.into(),
        // Citizens cannot post staff-only notes.
        is_visible: is_visible || author_type == AuthorType::User,
        created_at: now,
    };
    db::insert_comment(conn, &comment)?;
    Ok(comment)
}

// ═══════════════════════════════════════════════════════════
// Reads
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub service_name: String,
    pub center_name: String,
    pub comments: Vec<AppointmentComment>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub allowed_next: Vec<AppointmentStatus>,
}

pub fn get_details(
    conn: &Connection,
    principal: &Principal,
    id: &Uuid,
) -> Result<AppointmentDetails, WorkflowError> {
    if principal.is_staff() {
        principal.require(Permission::ManageAppointments)?;
    }
    let appointment = load_visible(conn, principal, id)?;

    let service_name = db::get_service(conn, &appointment.service_id)?
        .map(|s| s.name)
        .unwrap_or_else(|| "Unknown".into());
    let center_name = db::get_center(conn, &appointment.center_id)?
        .map(|c| c.name)
        .unwrap_or_else(|| "Unknown".into());

    let mut comments = db::get_comments(conn, &appointment.id)?;
    if !principal.is_staff() {
        comments.retain(|c| c.is_visible);
    }

    Ok(AppointmentDetails {
        service_name,
        center_name,
        comments,
        status_history: db::get_status_history(conn, &appointment.id)?,
        allowed_next: allowed_next(appointment.status).to_vec(),
        appointment,
    })
}

/// The calling citizen's own bookings.
pub fn list_for_user(conn: &Connection, principal: &Principal) -> Result<Vec<Appointment>, WorkflowError> {
    let filter = AppointmentFilter {
        user_id: Some(principal.user_id),
        ..Default::default()
    };
    Ok(db::list_appointments(conn, &filter)?)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffListQuery {
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub range: DateRange,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Admin only; ignored for staff.
    pub center_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Center-scoped, paginated appointment list for staff.
pub fn list_for_center(
    conn: &Connection,
    principal: &Principal,
    query: &StaffListQuery,
    today: NaiveDate,
) -> Result<Page<Appointment>, WorkflowError> {
    principal.require(Permission::ManageAppointments)?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let (date_from, date_to) = query.range.bounds(today);
    let filter = AppointmentFilter {
        center_id: principal
            .center_scope()
            .or(query.center_id.filter(|_| principal.is_admin())),
        status: query.status,
        date_from,
        date_to,
        ..Default::default()
    };

    // Slot labels do not sort lexically ("9:00 AM" > "10:00 AM"), so order
    // and page in memory.
    let mut items = db::list_appointments(conn, &filter)?;
    items.sort_by_key(|a| (a.appointment_date, slot_minutes(&a.time_slot), a.created_at));
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db::{open_database, open_memory_database};
    use crate::test_support::{self, seed, Fixture};

    fn request(id: Uuid, target: AppointmentStatus) -> TransitionRequest {
        TransitionRequest {
            appointment_id: id,
            target,
            reason: None,
            notes: None,
            expected_status: None,
        }
    }

    fn cancel(id: Uuid, reason: &str) -> TransitionRequest {
        TransitionRequest {
            reason: Some(reason.into()),
            ..request(id, AppointmentStatus::Cancelled)
        }
    }

    fn staff(conn: &Connection, fx: &Fixture) -> Principal {
        test_support::principal(conn, &fx.staff_user)
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use AppointmentStatus::*;
        assert!(can_transition(Pending, Confirmed));
        assert!(can_transition(Pending, Cancelled));
        assert!(can_transition(Confirmed, InProgress));
        assert!(can_transition(InProgress, Completed));
        assert!(!can_transition(Pending, InProgress));
        assert!(!can_transition(Pending, Completed));
        assert!(!can_transition(Confirmed, Confirmed));
        assert!(is_terminal(Completed));
        assert!(is_terminal(Cancelled));
        assert!(!is_terminal(InProgress));
    }

    #[test]
    fn slot_labels_parse_to_minutes() {
        assert_eq!(slot_minutes("9:00 AM"), Some(540));
        assert_eq!(slot_minutes("10:30 AM"), Some(630));
        assert_eq!(slot_minutes("12:15 PM"), Some(735));
        assert_eq!(slot_minutes("12:00 AM"), Some(0));
        assert_eq!(slot_minutes("4:45 PM"), Some(16 * 60 + 45));
        assert_eq!(slot_minutes("13:00 PM"), None);
        assert_eq!(slot_minutes("10:00"), None);
    }

    #[test]
    fn full_lifecycle_scenario() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let actor = staff(&conn, &fx);
        let now = Utc::now();

        let confirmed = transition(&mut conn, &actor, &request(appt.id, AppointmentStatus::Confirmed), now).unwrap();
        assert_eq!(confirmed.appointment.status, AppointmentStatus::Confirmed);
        assert_eq!(confirmed.notifications.len(), 1);
        assert_eq!(confirmed.notifications[0].recipient_id, fx.citizen.id);
        assert_eq!(confirmed.event.from_status, AppointmentStatus::Pending);

        transition(
            &mut conn,
            &actor,
            &request(appt.id, AppointmentStatus::InProgress),
            now + Duration::minutes(1),
        )
        .unwrap();

        let done = transition(
            &mut conn,
            &actor,
            &TransitionRequest {
                notes: Some("Certificate issued".into()),
                ..request(appt.id, AppointmentStatus::Completed)
            },
            now + Duration::minutes(26),
        )
        .unwrap();
        assert_eq!(done.appointment.status, AppointmentStatus::Completed);
        assert!(done.appointment.completed_at.is_some());
        assert_eq!(done.appointment.actual_duration_minutes, Some(25));
        assert_eq!(done.appointment.processing_notes.as_deref(), Some("Certificate issued"));

        let err = transition(&mut conn, &actor, &cancel(appt.id, "Too late"), now).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition { from: AppointmentStatus::Completed, .. }
        ));

        let history = db::get_status_history(&conn, &appt.id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].to_status, AppointmentStatus::Completed);
        assert_eq!(history[2].changed_by, fx.staff_user.id);

        let inbox = notifications::inbox(&conn, &fx.citizen.id).unwrap();
        assert_eq!(inbox.notifications.len(), 3);
    }

    #[test]
    fn every_illegal_pair_is_rejected_and_leaves_status() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let actor = staff(&conn, &fx);

        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                if can_transition(*from, *to) {
                    continue;
                }
                // With or without a reason, the table decides first.
                for reason in [Some("Checking"), None] {
                    let appt = test_support::appointment_on(&conn, &fx, fx.center.id, test_support::today(), *from);
                    let req = TransitionRequest {
                        reason: reason.map(String::from),
                        ..request(appt.id, *to)
                    };
                    let err = transition(&mut conn, &actor, &req, Utc::now()).unwrap_err();
                    assert!(
                        matches!(err, WorkflowError::IllegalTransition { .. }),
                        "{from} -> {to} (reason {reason:?}) should be illegal, got {err:?}"
                    );
                    let stored = db::get_appointment(&conn, &appt.id).unwrap().unwrap();
                    assert_eq!(stored.status, *from);
                    assert_eq!(stored.completed_at.is_some(), *from == AppointmentStatus::Completed);
                }
            }
        }
    }

    #[test]
    fn cancel_requires_reason_from_any_live_state() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let actor = staff(&conn, &fx);

        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
        ] {
            let appt = test_support::appointment_on(&conn, &fx, fx.center.id, test_support::today(), status);
            let err = transition(&mut conn, &actor, &cancel(appt.id, "   "), Utc::now()).unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)));

            let ok = transition(&mut conn, &actor, &cancel(appt.id, "Docs missing"), Utc::now()).unwrap();
            assert_eq!(ok.appointment.status, AppointmentStatus::Cancelled);
            assert!(ok.appointment.completed_at.is_none());
            assert_eq!(ok.notifications[0].title, "Appointment cancelled: Docs missing");
        }
    }

    #[test]
    fn unknown_appointment_is_not_found() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let actor = staff(&conn, &fx);
        let err = transition(&mut conn, &actor, &request(Uuid::new_v4(), AppointmentStatus::Confirmed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[test]
    fn stale_expected_status_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let actor = staff(&conn, &fx);

        let req = TransitionRequest {
            expected_status: Some(AppointmentStatus::Confirmed),
            ..request(appt.id, AppointmentStatus::InProgress)
        };
        let err = transition(&mut conn, &actor, &req, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition { from: AppointmentStatus::Pending, .. }
        ));
    }

    #[test]
    fn transition_requires_update_status_and_center() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);

        let citizen = test_support::principal(&conn, &fx.citizen);
        let err = transition(&mut conn, &citizen, &request(appt.id, AppointmentStatus::Confirmed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Auth(AuthError::Forbidden(_))));

        let elsewhere = test_support::user(&conn, "Other Center Staff", Role::Staff);
        test_support::staff_at(&conn, &elsewhere, &fx.other_center, &test_support::all_staff_permissions());
        let outsider = test_support::principal(&conn, &elsewhere);
        let err = transition(&mut conn, &outsider, &request(appt.id, AppointmentStatus::Confirmed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        let admin = test_support::principal(&conn, &fx.admin);
        assert!(transition(&mut conn, &admin, &request(appt.id, AppointmentStatus::Confirmed), Utc::now()).is_ok());
    }

    #[test]
    fn concurrent_conflicting_transitions_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let setup = open_database(&path).unwrap();
        let fx = seed(&setup);
        let appt = test_support::pending_appointment(&setup, &fx);
        let actor = staff(&setup, &fx);
        drop(setup);

        let barrier = Arc::new(Barrier::new(2));
        let attempts = [
            TransitionRequest {
                expected_status: Some(AppointmentStatus::Pending),
                ..request(appt.id, AppointmentStatus::Confirmed)
            },
            TransitionRequest {
                expected_status: Some(AppointmentStatus::Pending),
                ..cancel(appt.id, "Citizen called to cancel")
            },
        ];

        let handles: Vec<_> = attempts
            .into_iter()
            .map(|req| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                let actor = actor.clone();
                std::thread::spawn(move || {
                    let mut conn = open_database(&path).unwrap();
                    barrier.wait();
                    transition(&mut conn, &actor, &req, Utc::now()).map(|o| o.appointment.status)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(WorkflowError::IllegalTransition { .. }))));

        let conn = open_database(&path).unwrap();
        let stored = db::get_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, *winners[0]);
        assert_eq!(db::get_status_history(&conn, &appt.id).unwrap().len(), 1);
    }

    #[test]
    fn booking_creates_pending_and_notifies() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let citizen = test_support::principal(&conn, &fx.citizen);
        let req = BookingRequest {
            service_id: fx.service.id,
            center_id: fx.center.id,
            appointment_date: test_support::open_day(test_support::today() + Duration::days(2)),
            time_slot: "11:30 AM".into(),
            selected_documents: vec![
                DocumentSelection {
                    document_name: "Aadhaar Card".into(),
                    is_alternative: false,
                    alternative_name: None,
                },
                DocumentSelection {
                    document_name: "Ration Card".into(),
                    is_alternative: true,
                    alternative_name: Some("Electricity Bill".into()),
                },
            ],
            notes: Some("  ".into()),
        };

        let outcome = book_appointment(&mut conn, &citizen, &req, test_support::today(), Utc::now()).unwrap();
        assert_eq!(outcome.appointment.status, AppointmentStatus::Pending);
        assert_eq!(outcome.appointment.notes, None);
        assert_eq!(outcome.appointment.selected_documents[1].resolved_name(), "Electricity Bill");
        assert_eq!(outcome.notifications.len(), 2);

        let mine = list_for_user(&conn, &citizen).unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[test]
    fn booking_rejects_bad_input() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let citizen = test_support::principal(&conn, &fx.citizen);
        // A Monday
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let base = BookingRequest {
            service_id: fx.service.id,
            center_id: fx.center.id,
            appointment_date: today,
            time_slot: "10:00 AM".into(),
            selected_documents: vec![],
            notes: None,
        };

        let past = BookingRequest {
            appointment_date: today - Duration::days(1),
            ..base.clone()
        };
        assert!(matches!(
            book_appointment(&mut conn, &citizen, &past, today, Utc::now()),
            Err(WorkflowError::Validation(_))
        ));

        let bad_slot = BookingRequest {
            time_slot: "25:00".into(),
            ..base.clone()
        };
        assert!(matches!(
            book_appointment(&mut conn, &citizen, &bad_slot, today, Utc::now()),
            Err(WorkflowError::Validation(_))
        ));

        for slot in ["8:30 AM", "5:00 PM", "11:30 PM", "12:00 AM"] {
            let outside = BookingRequest {
                time_slot: slot.into(),
                ..base.clone()
            };
            assert!(
                matches!(
                    book_appointment(&mut conn, &citizen, &outside, today, Utc::now()),
                    Err(WorkflowError::Validation(_))
                ),
                "{slot} is outside opening hours"
            );
        }

        for closed in [
            NaiveDate::from_ymd_opt(2026, 10, 25).unwrap(), // Sunday
            NaiveDate::from_ymd_opt(2026, 11, 14).unwrap(), // second Saturday
        ] {
            let holiday = BookingRequest {
                appointment_date: closed,
                ..base.clone()
            };
            assert!(matches!(
                book_appointment(&mut conn, &citizen, &holiday, today, Utc::now()),
                Err(WorkflowError::Validation(_))
            ));
        }

        let no_service = BookingRequest {
            service_id: Uuid::new_v4(),
            ..base.clone()
        };
        assert!(matches!(
            book_appointment(&mut conn, &citizen, &no_service, today, Utc::now()),
            Err(WorkflowError::NotFound(_))
        ));

        let staff = staff(&conn, &fx);
        assert!(matches!(
            book_appointment(&mut conn, &staff, &base, today, Utc::now()),
            Err(WorkflowError::Auth(AuthError::Forbidden(_)))
        ));
    }

    #[test]
    fn closed_days() {
        let date = |d| NaiveDate::from_ymd_opt(2026, 10, d).unwrap();
        assert!(closed_reason(date(25)).is_some()); // Sunday
        assert!(closed_reason(date(10)).is_some()); // second Saturday
        assert!(closed_reason(date(3)).is_none()); // first Saturday
        assert!(closed_reason(date(17)).is_none()); // third Saturday
        assert!(closed_reason(date(19)).is_none());
        assert_eq!(test_support::open_day(date(25)), date(26));
    }

    #[test]
    fn taken_slot_is_rejected_until_freed() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let citizen = test_support::principal(&conn, &fx.citizen);
        let neighbour_user = test_support::user(&conn, "Meera Pillai", Role::User);
        let neighbour = test_support::principal(&conn, &neighbour_user);
        let today = test_support::today();
        let req = BookingRequest {
            service_id: fx.service.id,
            center_id: fx.center.id,
            appointment_date: test_support::open_day(today + Duration::days(2)),
            time_slot: "10:00 AM".into(),
            selected_documents: vec![],
            notes: None,
        };

        let first = book_appointment(&mut conn, &citizen, &req, today, Utc::now()).unwrap();
        assert!(matches!(
            book_appointment(&mut conn, &neighbour, &req, today, Utc::now()),
            Err(WorkflowError::Validation(msg)) if msg == "This time slot is already booked"
        ));

        // Same slot at another center is free.
        let elsewhere = BookingRequest {
            center_id: fx.other_center.id,
            ..req.clone()
        };
        assert!(book_appointment(&mut conn, &neighbour, &elsewhere, today, Utc::now()).is_ok());

        cancel_own(&mut conn, &citizen, &first.appointment.id, None, Utc::now()).unwrap();
        assert!(book_appointment(&mut conn, &neighbour, &req, today, Utc::now()).is_ok());
    }

    #[test]
    fn citizen_cancels_own_booking_before_cutoff() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let citizen = test_support::principal(&conn, &fx.citizen);
        let appt = test_support::appointment_on(
            &conn,
            &fx,
            fx.center.id,
            test_support::today() + Duration::days(2),
            AppointmentStatus::Confirmed,
        );

        let outcome = cancel_own(&mut conn, &citizen, &appt.id, Some("  "), Utc::now()).unwrap();
        assert_eq!(outcome.appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(outcome.event.actor, fx.citizen.id);
        assert_eq!(outcome.notifications[0].recipient_id, fx.citizen.id);
        assert_eq!(outcome.notifications[0].title, "Appointment cancelled: Cancelled by citizen");

        let history = db::get_status_history(&conn, &appt.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, AppointmentStatus::Confirmed);
        assert_eq!(history[0].changed_by, fx.citizen.id);

        // Terminal now.
        assert!(matches!(
            cancel_own(&mut conn, &citizen, &appt.id, None, Utc::now()),
            Err(WorkflowError::IllegalTransition { from: AppointmentStatus::Cancelled, .. })
        ));
    }

    #[test]
    fn citizen_cancel_rules() {
        let mut conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let citizen = test_support::principal(&conn, &fx.citizen);
        let today = test_support::today();

        let due_today = test_support::appointment_on(&conn, &fx, fx.center.id, today, AppointmentStatus::Pending);
        let at = |hour| {
            Local
                .from_local_datetime(&today.and_hms_opt(hour, 0, 0).unwrap())
                .earliest()
                .unwrap()
                .with_timezone(&Utc)
        };
        assert!(matches!(
            cancel_own(&mut conn, &citizen, &due_today.id, Some("Sick"), at(10)),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            cancel_own(&mut conn, &citizen, &due_today.id, Some("Sick"), at(9)),
            Err(WorkflowError::Validation(_))
        ));
        let early = cancel_own(&mut conn, &citizen, &due_today.id, Some("Sick"), at(8)).unwrap();
        assert_eq!(early.event.reason.as_deref(), Some("Sick"));

        let started = test_support::appointment_on(
            &conn,
            &fx,
            fx.center.id,
            today + Duration::days(1),
            AppointmentStatus::InProgress,
        );
        assert!(matches!(
            cancel_own(&mut conn, &citizen, &started.id, None, Utc::now()),
            Err(WorkflowError::IllegalTransition { from: AppointmentStatus::InProgress, .. })
        ));

        let upcoming = test_support::appointment_on(
            &conn,
            &fx,
            fx.center.id,
            today + Duration::days(1),
            AppointmentStatus::Pending,
        );
        let stranger_user = test_support::user(&conn, "Stranger", Role::User);
        let stranger = test_support::principal(&conn, &stranger_user);
        assert!(matches!(
            cancel_own(&mut conn, &stranger, &upcoming.id, None, Utc::now()),
            Err(WorkflowError::NotFound(_))
        ));
        let clerk = staff(&conn, &fx);
        assert!(matches!(
            cancel_own(&mut conn, &clerk, &upcoming.id, None, Utc::now()),
            Err(WorkflowError::Auth(AuthError::Forbidden(_)))
        ));
        assert_eq!(
            db::get_appointment(&conn, &upcoming.id).unwrap().unwrap().status,
            AppointmentStatus::Pending
        );
    }

    #[test]
    fn comments_respect_author_and_visibility() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let appt = test_support::pending_appointment(&conn, &fx);
        let clerk = staff(&conn, &fx);
        let citizen = test_support::principal(&conn, &fx.citizen);

        let internal = add_comment(&conn, &clerk, &appt.id, "Check address proof", false, Utc::now()).unwrap();
        assert_eq!(internal.author_type, AuthorType::Staff);
        assert!(!internal.is_visible);

        let reply = add_comment(&conn, &citizen, &appt.id, "I will bring it", false, Utc::now()).unwrap();
        assert_eq!(reply.author_type, AuthorType::User);
        assert!(reply.is_visible);

        assert!(matches!(
            add_comment(&conn, &citizen, &appt.id, "  ", true, Utc::now()),
            Err(WorkflowError::Validation(_))
        ));

        let stranger_user = test_support::user(&conn, "Stranger", Role::User);
        let stranger = test_support::principal(&conn, &stranger_user);
        assert!(matches!(
            add_comment(&conn, &stranger, &appt.id, "Hello", true, Utc::now()),
            Err(WorkflowError::NotFound(_))
        ));

        let citizen_view = get_details(&conn, &citizen, &appt.id).unwrap();
        assert_eq!(citizen_view.comments.len(), 1);
        let staff_view = get_details(&conn, &clerk, &appt.id).unwrap();
        assert_eq!(staff_view.comments.len(), 2);
        assert_eq!(staff_view.service_name, "Income Certificate");
        assert_eq!(
            staff_view.allowed_next,
            vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled]
        );
    }

    #[test]
    fn staff_listing_is_scoped_sorted_and_paged() {
        let conn = open_memory_database().unwrap();
        let fx = seed(&conn);
        let today = test_support::today();
        let late = test_support::appointment_on(&conn, &fx, fx.center.id, today, AppointmentStatus::Pending);
        conn.execute(
            "UPDATE appointments SET time_slot = '10:00 AM' WHERE id = ?1",
            [late.id.to_string()],
        )
        .unwrap();
        let early = test_support::appointment_on(&conn, &fx, fx.center.id, today, AppointmentStatus::Confirmed);
        conn.execute(
            "UPDATE appointments SET time_slot = '9:00 AM' WHERE id = ?1",
            [early.id.to_string()],
        )
        .unwrap();
        test_support::appointment_on(&conn, &fx, fx.other_center.id, today, AppointmentStatus::Pending);

        let clerk = staff(&conn, &fx);
        let page = list_for_center(&conn, &clerk, &StaffListQuery::default(), today).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.items[0].id, early.id);

        let admin = test_support::principal(&conn, &fx.admin);
        let all = list_for_center(&conn, &admin, &StaffListQuery::default(), today).unwrap();
        assert_eq!(all.total, 3);

        let tiny = StaffListQuery {
            limit: Some(1),
            page: Some(2),
            ..Default::default()
        };
        let second = list_for_center(&conn, &clerk, &tiny, today).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.page, 2);

    }
}
