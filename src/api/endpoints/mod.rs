//! API endpoint handlers.
//!
//! Handlers parse the request, open a connection and delegate to the
//! workflow modules; rules live in those modules, not here.

pub mod appointments;
pub mod health;
pub mod notifications;
pub mod settings;
pub mod staff;

use uuid::Uuid;

use crate::api::error::ApiError;

/// Parse a path id, answering 400 instead of axum's plain-text rejection.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".into()))
}
