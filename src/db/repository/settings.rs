use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::SystemSettings;

pub fn get_system_settings(conn: &Connection) -> Result<SystemSettings, DatabaseError> {
    let settings = conn.query_row(
        "SELECT maintenance_mode, maintenance_message, estimated_downtime
         FROM system_settings WHERE id = 1",
        [],
        |row| {
            Ok(SystemSettings {
                maintenance_mode: row.get(0)?,
                maintenance_message: row.get(1)?,
                estimated_downtime: row.get(2)?,
            })
        },
    )?;
    Ok(settings)
}

pub fn update_system_settings(
    conn: &Connection,
    settings: &SystemSettings,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE system_settings
         SET maintenance_mode = ?1, maintenance_message = ?2, estimated_downtime = ?3
         WHERE id = 1",
        params![
            settings.maintenance_mode,
            settings.maintenance_message,
            settings.estimated_downtime,
        ],
    )?;
    Ok(())
}
