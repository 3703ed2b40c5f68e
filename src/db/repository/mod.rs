//! Repository layer: entity-scoped database operations.
//!
//! All public functions are re-exported here so callers use `db::insert_*`.

mod appointment;
mod directory;
mod notification;
mod settings;

use uuid::Uuid;

use super::DatabaseError;

pub use appointment::*;
pub use directory::*;
pub use notification::*;
pub use settings::*;

/// Parse a TEXT primary/foreign key column.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
