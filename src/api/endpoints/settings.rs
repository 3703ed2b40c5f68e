//! Portal settings endpoints.

use axum::extract::State;
use axum::Extension;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Principal;
use crate::db;
use crate::models::SystemSettings;

/// `GET /api/settings/public`: no token needed; served from the cache.
pub async fn public(State(ctx): State<ApiContext>) -> Json<SystemSettings> {
    Json(ctx.system_settings())
}

/// `PUT /api/admin/settings`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(mut settings): Json<SystemSettings>,
) -> Result<Json<SystemSettings>, ApiError> {
    principal.require_admin()?;
    settings.maintenance_message = settings
        .maintenance_message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    let conn = ctx.core.open_db()?;
    db::update_system_settings(&conn, &settings)?;
    ctx.settings.invalidate();

    tracing::info!(
        admin = %principal.user_id,
        maintenance = settings.maintenance_mode,
        "System settings updated"
    );
    Ok(Json(settings))
}
