//! Notification inbox endpoints.

use axum::extract::{Path, State};
use axum::Extension;
use axum::Json;
use serde::Serialize;

use crate::api::endpoints::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Principal;
use crate::db;
use crate::notifications::{self, Inbox};

/// `GET /api/notifications`: newest first, capped, with the unread count.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Inbox>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(notifications::inbox(&conn, &principal.user_id)?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedResponse {
    pub updated: usize,
}

/// `POST /api/notifications/mark-read`
pub async fn mark_all_read(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MarkedResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let updated = db::mark_all_read(&conn, &principal.user_id)?;
    Ok(Json(MarkedResponse { updated }))
}

/// `PUT /api/notifications/:id/read`
pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<MarkedResponse>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    db::mark_notification_read(&conn, &id, &principal.user_id)?;
    Ok(Json(MarkedResponse { updated: 1 }))
}
