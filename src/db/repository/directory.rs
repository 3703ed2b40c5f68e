//! Users, staff assignments, centers and services.
//!
//! The appointment workflow only reads these; the insert functions exist for
//! seeding and tests.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::{Permission, Role, StaffRole};
use crate::models::*;

// ── Users ───────────────────────────────────────────────────

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, name, email, phone, role, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.phone,
            user.role.as_str(),
            user.is_active,
            user.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, email, phone, role, is_active, created_at
             FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, DateTime<Utc>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, email, phone, role, is_active, created_at)) = row else {
        return Ok(None);
    };
    Ok(Some(User {
        id: parse_uuid(&id)?,
        name,
        email,
        phone,
        role: Role::from_str(&role)?,
        is_active,
        created_at,
    }))
}

// ── Staff ───────────────────────────────────────────────────

pub fn insert_staff(conn: &Connection, staff: &Staff) -> Result<(), DatabaseError> {
    let permissions: Vec<&str> = staff.permissions.iter().map(|p| p.as_str()).collect();
    let permissions_json = serde_json::to_string(&permissions)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO staff (id, user_id, center_id, role, permissions, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            staff.id.to_string(),
            staff.user_id.to_string(),
            staff.center_id.to_string(),
            staff.role.as_str(),
            permissions_json,
            staff.is_active,
        ],
    )?;
    Ok(())
}

fn staff_from_columns(
    id: String,
    user_id: String,
    center_id: String,
    role: String,
    permissions_json: String,
    is_active: bool,
) -> Result<Staff, DatabaseError> {
    let names: Vec<String> = serde_json::from_str(&permissions_json)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid permissions: {e}")))?;
    // Unknown permission names (retired actions) are skipped, not fatal.
    let permissions = names
        .iter()
        .filter_map(|n| Permission::from_str(n).ok())
        .collect();
    Ok(Staff {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        center_id: parse_uuid(&center_id)?,
        role: StaffRole::from_str(&role)?,
        permissions,
        is_active,
    })
}

pub fn get_staff_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Staff>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, user_id, center_id, role, permissions, is_active
             FROM staff WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, user_id, center_id, role, perms, active)| {
        staff_from_columns(id, user_id, center_id, role, perms, active)
    })
    .transpose()
}

/// User ids of active staff at a center whose user account is also active.
pub fn active_staff_user_ids(conn: &Connection, center_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.user_id FROM staff s
         JOIN users u ON u.id = s.user_id
         WHERE s.center_id = ?1 AND s.is_active = 1 AND u.is_active = 1
         ORDER BY s.user_id",
    )?;
    let rows = stmt.query_map(params![center_id.to_string()], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

// ── Centers ─────────────────────────────────────────────────

pub fn insert_center(conn: &Connection, center: &Center) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO centers (id, name, address, is_active) VALUES (?1, ?2, ?3, ?4)",
        params![center.id.to_string(), center.name, center.address, center.is_active],
    )?;
    Ok(())
}

pub fn get_center(conn: &Connection, id: &Uuid) -> Result<Option<Center>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, address, is_active FROM centers WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, address, is_active)) = row else {
        return Ok(None);
    };
    Ok(Some(Center {
        id: parse_uuid(&id)?,
        name,
        address,
        is_active,
    }))
}

// ── Services ────────────────────────────────────────────────

pub fn insert_service(conn: &Connection, service: &Service) -> Result<(), DatabaseError> {
    let docs_json = serde_json::to_string(&service.required_documents)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO services (id, name, category, fee, processing_time, required_documents, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            service.id.to_string(),
            service.name,
            service.category,
            service.fee,
            service.processing_time,
            docs_json,
            service.is_active,
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &Uuid) -> Result<Option<Service>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, category, fee, processing_time, required_documents, is_active
             FROM services WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, category, fee, processing_time, docs_json, is_active)) = row else {
        return Ok(None);
    };
    // A malformed document list degrades to empty rather than hiding the service.
    let required_documents = serde_json::from_str(&docs_json).unwrap_or_default();
    Ok(Some(Service {
        id: parse_uuid(&id)?,
        name,
        category,
        fee,
        processing_time,
        required_documents,
        is_active,
    }))
}
