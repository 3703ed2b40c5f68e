//! Appointment endpoints.
//!
//! - `POST /api/appointments`: book (citizen)
//! - `GET  /api/appointments`: caller's own bookings
//! - `GET  /api/appointments/:id`: details with comments and history
//! - `DELETE /api/appointments/:id?reason=`: citizen cancels own booking
//! - `PUT  /api/appointments/:id/status`: state machine transition
//! - `POST /api/appointments/:id/comments`: append a comment
//! - `PUT  /api/appointments/:id/validation`: record document validation
//! - `POST /api/appointments/:id/notify-missing-documents`: ask for documents

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::appointment::{self, AppointmentDetails, BookingRequest, TransitionRequest};
use crate::authorization::Principal;
use crate::documents::{self, MissingDocumentsRequest, ValidationInput};
use crate::models::enums::AppointmentStatus;
use crate::models::{Appointment, AppointmentComment, DocumentValidation, Notification};

fn parse_status(field: &str, raw: &str) -> Result<AppointmentStatus, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {field} '{raw}'")))
}

// ── Booking & listing ───────────────────────────────────────

/// `POST /api/appointments`
pub async fn book(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let outcome = appointment::book_appointment(
        &mut conn,
        &principal,
        &req,
        Local::now().date_naive(),
        Utc::now(),
    )?;
    ctx.core.dispatcher().deliver(outcome.notifications);
    Ok((StatusCode::CREATED, Json(outcome.appointment)))
}

#[derive(Serialize)]
pub struct AppointmentsResponse {
    pub appointments: Vec<Appointment>,
}

/// `GET /api/appointments`
pub async fn list_mine(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<AppointmentsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let appointments = appointment::list_for_user(&conn, &principal)?;
    Ok(Json(AppointmentsResponse { appointments }))
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentDetails>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(appointment::get_details(&conn, &principal, &id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `DELETE /api/appointments/:id`
pub async fn cancel_own(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&id)?;
    let mut conn = ctx.core.open_db()?;
    let outcome =
        appointment::cancel_own(&mut conn, &principal, &id, params.reason.as_deref(), Utc::now())?;
    ctx.core.dispatcher().deliver(outcome.notifications);
    Ok(Json(outcome.appointment))
}

// ── Status ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_status: Option<String>,
}

/// `PUT /api/appointments/:id/status`
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Appointment>, ApiError> {
    let req = TransitionRequest {
        appointment_id: parse_id(&id)?,
        target: parse_status("status", &body.status)?,
        reason: body.reason,
        notes: body.notes,
        expected_status: body
            .expected_status
            .as_deref()
            .map(|s| parse_status("expectedStatus", s))
            .transpose()?,
    };

    let mut conn = ctx.core.open_db()?;
    let outcome = appointment::transition(&mut conn, &principal, &req, Utc::now())?;
    ctx.core.dispatcher().deliver(outcome.notifications);
    Ok(Json(outcome.appointment))
}

// ── Comments ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    #[serde(alias = "content")]
    pub comment: String,
    #[serde(default = "visible_by_default")]
    pub is_visible: bool,
}

fn visible_by_default() -> bool {
    true
}

/// `POST /api/appointments/:id/comments`
pub async fn add_comment(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<AppointmentComment>), ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    let comment =
        appointment::add_comment(&conn, &principal, &id, &body.comment, body.is_visible, Utc::now())?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// ── Documents ───────────────────────────────────────────────

/// `PUT /api/appointments/:id/validation`
pub async fn record_validation(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<ValidationInput>,
) -> Result<Json<DocumentValidation>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(documents::record_validation(
        &conn,
        &principal,
        &id,
        &body,
        Utc::now(),
    )?))
}

/// `POST /api/appointments/:id/notify-missing-documents`
pub async fn notify_missing_documents(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<MissingDocumentsRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    let notification =
        documents::notify_missing_documents(&conn, &principal, &id, &body, Utc::now())?;
    ctx.core.dispatcher().deliver(vec![notification.clone()]);
    Ok((StatusCode::CREATED, Json(notification)))
}
