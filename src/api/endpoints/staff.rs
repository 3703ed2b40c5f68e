//! Staff dashboard endpoints.
//!
//! Center scoping is resolved from the principal; admins may pass
//! `centerId` to look at a single center.

use axum::extract::{Query, State};
use axum::Extension;
use axum::Json;
use chrono::Local;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::appointment::{self, Page, StaffListQuery};
use crate::authorization::Principal;
use crate::dashboard::{self, AppointmentStats, DashboardQuery, DashboardSnapshot};
use crate::models::Appointment;

/// `GET /api/staff/dashboard?range=&centerId=`
pub async fn dashboard(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let conn = ctx.core.open_db()?;
    let snapshot = dashboard::get_snapshot(&conn, &principal, &query, Local::now().date_naive())?;
    Ok(Json(snapshot))
}

/// `GET /api/staff/appointments?status=&range=&page=&limit=`
pub async fn appointments(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<StaffListQuery>,
) -> Result<Json<Page<Appointment>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let page = appointment::list_for_center(&conn, &principal, &query, Local::now().date_naive())?;
    Ok(Json(page))
}

/// `GET /api/staff/stats?range=`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<AppointmentStats>, ApiError> {
    let conn = ctx.core.open_db()?;
    let stats = dashboard::get_stats(&conn, &principal, &query, Local::now().date_naive())?;
    Ok(Json(stats))
}
