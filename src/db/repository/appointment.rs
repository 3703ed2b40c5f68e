use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::{AppointmentStatus, AuthorType};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "a.id, a.user_id, a.service_id, a.center_id, a.appointment_date,
     a.time_slot, a.status, a.selected_documents, a.is_validated, a.validated_at,
     a.validated_by, a.staff_notes, a.missing_documents, a.notes, a.processing_notes,
     a.created_at, a.completed_at, a.actual_duration_minutes";

/// Filter for appointment listings. `date_to` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub center_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Raw column values, converted to the model outside the rusqlite closure
/// so enum/JSON failures surface as `DatabaseError`.
struct AppointmentRow {
    id: String,
    user_id: String,
    service_id: String,
    center_id: String,
    appointment_date: NaiveDate,
    time_slot: String,
    status: String,
    selected_documents: String,
    is_validated: bool,
    validated_at: Option<DateTime<Utc>>,
    validated_by: Option<String>,
    staff_notes: Option<String>,
    missing_documents: String,
    notes: Option<String>,
    processing_notes: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    actual_duration_minutes: Option<i64>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_id: row.get(2)?,
        center_id: row.get(3)?,
        appointment_date: row.get(4)?,
        time_slot: row.get(5)?,
        status: row.get(6)?,
        selected_documents: row.get(7)?,
        is_validated: row.get(8)?,
        validated_at: row.get(9)?,
        validated_by: row.get(10)?,
        staff_notes: row.get(11)?,
        missing_documents: row.get(12)?,
        notes: row.get(13)?,
        processing_notes: row.get(14)?,
        created_at: row.get(15)?,
        completed_at: row.get(16)?,
        actual_duration_minutes: row.get(17)?,
    })
}

impl AppointmentRow {
    fn into_model(self) -> Result<Appointment, DatabaseError> {
        let selected_documents: Vec<SelectedDocument> =
            serde_json::from_str(&self.selected_documents).map_err(|e| {
                DatabaseError::ConstraintViolation(format!("Invalid selected_documents: {e}"))
            })?;
        let missing_documents: Vec<String> = serde_json::from_str(&self.missing_documents)
            .map_err(|e| {
                DatabaseError::ConstraintViolation(format!("Invalid missing_documents: {e}"))
            })?;

        Ok(Appointment {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            service_id: parse_uuid(&self.service_id)?,
            center_id: parse_uuid(&self.center_id)?,
            appointment_date: self.appointment_date,
            time_slot: self.time_slot,
            status: AppointmentStatus::from_str(&self.status)?,
            selected_documents,
            document_validation: DocumentValidation {
                is_validated: self.is_validated,
                validated_at: self.validated_at,
                validated_by: self.validated_by.as_deref().map(parse_uuid).transpose()?,
                staff_notes: self.staff_notes,
                missing_documents,
            },
            notes: self.notes,
            processing_notes: self.processing_notes,
            created_at: self.created_at,
            completed_at: self.completed_at,
            actual_duration_minutes: self.actual_duration_minutes,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    let v = &appt.document_validation;
    conn.execute(
        "INSERT INTO appointments
         (id, user_id, service_id, center_id, appointment_date, time_slot, status,
          selected_documents, is_validated, validated_at, validated_by, staff_notes,
          missing_documents, notes, processing_notes, created_at, completed_at,
          actual_duration_minutes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            appt.id.to_string(),
            appt.user_id.to_string(),
            appt.service_id.to_string(),
            appt.center_id.to_string(),
            appt.appointment_date,
            appt.time_slot,
            appt.status.as_str(),
            to_json(&appt.selected_documents)?,
            v.is_validated,
            v.validated_at,
            v.validated_by.map(|id| id.to_string()),
            v.staff_notes,
            to_json(&v.missing_documents)?,
            appt.notes,
            appt.processing_notes,
            appt.created_at,
            appt.completed_at,
            appt.actual_duration_minutes,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1");
    conn.query_row(&sql, params![id.to_string()], read_row)
        .optional()?
        .map(AppointmentRow::into_model)
        .transpose()
}

/// Whether a live (pending or confirmed) booking already holds the slot.
pub fn slot_taken(
    conn: &Connection,
    center_id: &Uuid,
    date: NaiveDate,
    time_slot: &str,
) -> Result<bool, DatabaseError> {
    let taken = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM appointments
             WHERE center_id = ?1 AND appointment_date = ?2 AND time_slot = ?3
               AND status IN ('pending', 'confirmed'))",
        params![center_id.to_string(), date, time_slot],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(taken)
}

fn push_filter(
    filter: &AppointmentFilter,
    sql: &mut String,
    params_vec: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
) {
    if let Some(center) = filter.center_id {
        params_vec.push(Box::new(center.to_string()));
        sql.push_str(&format!(" AND a.center_id = ?{}", params_vec.len()));
    }
    if let Some(user) = filter.user_id {
        params_vec.push(Box::new(user.to_string()));
        sql.push_str(&format!(" AND a.user_id = ?{}", params_vec.len()));
    }
    if let Some(status) = filter.status {
        params_vec.push(Box::new(status.as_str()));
        sql.push_str(&format!(" AND a.status = ?{}", params_vec.len()));
    }
    if let Some(from) = filter.date_from {
        params_vec.push(Box::new(from));
        sql.push_str(&format!(" AND a.appointment_date >= ?{}", params_vec.len()));
    }
    if let Some(to) = filter.date_to {
        params_vec.push(Box::new(to));
        sql.push_str(&format!(" AND a.appointment_date < ?{}", params_vec.len()));
    }
}

/// List appointments ordered by date then slot label.
pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    push_filter(filter, &mut sql, &mut params_vec);

    sql.push_str(" ORDER BY a.appointment_date ASC, a.time_slot ASC, a.created_at ASC");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), read_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(row?.into_model()?);
    }
    Ok(appointments)
}

/// Fields written by an accepted status transition.
#[derive(Debug, Clone)]
pub struct StatusUpdate<'a> {
    pub to: AppointmentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i64>,
    pub processing_notes: Option<&'a str>,
}

/// Conditional status write keyed on the expected current status.
///
/// Returns the number of rows changed: 0 means the appointment is gone or
/// its status moved since `expected` was read.
pub fn update_status_if(
    conn: &Connection,
    id: &Uuid,
    expected: AppointmentStatus,
    update: &StatusUpdate<'_>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments
         SET status = ?1,
             completed_at = ?2,
             actual_duration_minutes = COALESCE(?3, actual_duration_minutes),
             processing_notes = COALESCE(?4, processing_notes)
         WHERE id = ?5 AND status = ?6",
        params![
            update.to.as_str(),
            update.completed_at,
            update.actual_duration_minutes,
            update.processing_notes,
            id.to_string(),
            expected.as_str(),
        ],
    )?;
    Ok(changed)
}

pub fn update_document_validation(
    conn: &Connection,
    id: &Uuid,
    validation: &DocumentValidation,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments
         SET is_validated = ?1, validated_at = ?2, validated_by = ?3,
             staff_notes = ?4, missing_documents = ?5
         WHERE id = ?6",
        params![
            validation.is_validated,
            validation.validated_at,
            validation.validated_by.map(|v| v.to_string()),
            validation.staff_notes,
            to_json(&validation.missing_documents)?,
            id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Appointment", id));
    }
    Ok(())
}

// ── Status history ──────────────────────────────────────────

pub fn insert_status_history(
    conn: &Connection,
    entry: &StatusHistoryEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO status_history
         (appointment_id, from_status, to_status, changed_by, reason, notes, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.appointment_id.to_string(),
            entry.from_status.as_str(),
            entry.to_status.as_str(),
            entry.changed_by.to_string(),
            entry.reason,
            entry.notes,
            entry.changed_at,
        ],
    )?;
    Ok(())
}

pub fn get_status_history(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Vec<StatusHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT appointment_id, from_status, to_status, changed_by, reason, notes, changed_at
         FROM status_history WHERE appointment_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![appointment_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, DateTime<Utc>>(6)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (appt_id, from, to, by, reason, notes, changed_at) = row?;
        entries.push(StatusHistoryEntry {
            appointment_id: parse_uuid(&appt_id)?,
            from_status: AppointmentStatus::from_str(&from)?,
            to_status: AppointmentStatus::from_str(&to)?,
            changed_by: parse_uuid(&by)?,
            reason,
            notes,
            changed_at,
        });
    }
    Ok(entries)
}

/// When the appointment most recently entered `in_progress`, if ever.
pub fn started_at(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    let ts = conn
        .query_row(
            "SELECT changed_at FROM status_history
             WHERE appointment_id = ?1 AND to_status = 'in_progress'
             ORDER BY id DESC LIMIT 1",
            params![appointment_id.to_string()],
            |row| row.get::<_, DateTime<Utc>>(0),
        )
        .optional()?;
    Ok(ts)
}

// ── Comments ────────────────────────────────────────────────

pub fn insert_comment(conn: &Connection, comment: &AppointmentComment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointment_comments
         (id, appointment_id, author_id, author_type, content, is_visible, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            comment.id.to_string(),
            comment.appointment_id.to_string(),
            comment.author_id.to_string(),
            comment.author_type.as_str(),
            comment.content,
            comment.is_visible,
            comment.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_comments(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Vec<AppointmentComment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, author_id, author_type, content, is_visible, created_at
         FROM appointment_comments WHERE appointment_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![appointment_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, bool>(5)?,
            row.get::<_, DateTime<Utc>>(6)?,
        ))
    })?;

    let mut comments = Vec::new();
    for row in rows {
        let (id, appt_id, author_id, author_type, content, is_visible, created_at) = row?;
        comments.push(AppointmentComment {
            id: parse_uuid(&id)?,
            appointment_id: parse_uuid(&appt_id)?,
            author_id: parse_uuid(&author_id)?,
            author_type: AuthorType::from_str(&author_type)?,
            content,
            is_visible,
            created_at,
        });
    }
    Ok(comments)
}
