//! Maintenance-mode gate.
//!
//! While the portal is in maintenance every route answers 503, except
//! health, the public settings read and the admin surface used to turn
//! maintenance off again.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

const EXEMPT_PATHS: &[&str] = &["/api/health", "/api/settings/public"];
const EXEMPT_PREFIX: &str = "/api/admin/";

fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path) || path.starts_with(EXEMPT_PREFIX)
}

pub async fn check_maintenance(req: Request<axum::body::Body>, next: Next) -> Response {
    if is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(ctx) = req.extensions().get::<ApiContext>().cloned() else {
        return ApiError::Internal("missing API context".into()).into_response();
    };
    let settings = ctx.system_settings();
    if settings.maintenance_mode {
        return ApiError::Maintenance(settings.maintenance_message).into_response();
    }
    next.run(req).await
}
