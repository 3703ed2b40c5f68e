use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::NotificationType;
use crate::models::Notification;

pub fn insert_notification(conn: &Connection, n: &Notification) -> Result<(), DatabaseError> {
    let meta = n.meta.as_ref().map(|m| m.to_string());
    conn.execute(
        "INSERT INTO notifications
         (id, recipient_id, type, title, message, meta, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            n.id.to_string(),
            n.recipient_id.to_string(),
            n.notification_type.as_str(),
            n.title,
            n.message,
            meta,
            n.is_read,
            n.created_at,
        ],
    )?;
    Ok(())
}

/// Newest-first inbox for one recipient.
pub fn list_notifications(
    conn: &Connection,
    recipient_id: &Uuid,
    limit: u32,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, type, title, message, meta, is_read, created_at
         FROM notifications WHERE recipient_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![recipient_id.to_string(), limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, bool>(6)?,
            row.get::<_, DateTime<Utc>>(7)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, recipient, kind, title, message, meta, is_read, created_at) = row?;
        items.push(Notification {
            id: parse_uuid(&id)?,
            recipient_id: parse_uuid(&recipient)?,
            notification_type: NotificationType::from_str(&kind)?,
            title,
            message,
            meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
            is_read,
            created_at,
        });
    }
    Ok(items)
}

pub fn count_unread(conn: &Connection, recipient_id: &Uuid) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
        params![recipient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Mark one notification read. Scoped to the recipient so one user cannot
/// touch another's inbox.
pub fn mark_notification_read(
    conn: &Connection,
    id: &Uuid,
    recipient_id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
        params![id.to_string(), recipient_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Notification", id));
    }
    Ok(())
}

pub fn mark_all_read(conn: &Connection, recipient_id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
        params![recipient_id.to_string()],
    )?;
    Ok(changed)
}
