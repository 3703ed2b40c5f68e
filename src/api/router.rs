//! Portal API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Maintenance gate → 2. Auth validator → 3. Audit logger

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the portal API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>, settings_ttl: Duration) -> Router {
    build_router(ApiContext::new(core, settings_ttl))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/appointments",
            post(endpoints::appointments::book).get(endpoints::appointments::list_mine),
        )
        .route(
            "/appointments/:id",
            get(endpoints::appointments::detail).delete(endpoints::appointments::cancel_own),
        )
        .route(
            "/appointments/:id/status",
            put(endpoints::appointments::update_status),
        )
        .route(
            "/appointments/:id/comments",
            post(endpoints::appointments::add_comment),
        )
        .route(
            "/appointments/:id/validation",
            put(endpoints::appointments::record_validation),
        )
        .route(
            "/appointments/:id/notify-missing-documents",
            post(endpoints::appointments::notify_missing_documents),
        )
        .route("/notifications", get(endpoints::notifications::list))
        .route(
            "/notifications/mark-read",
            post(endpoints::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            put(endpoints::notifications::mark_read),
        )
        .route("/staff/dashboard", get(endpoints::staff::dashboard))
        .route("/staff/appointments", get(endpoints::staff::appointments))
        .route("/staff/stats", get(endpoints::staff::stats))
        .route("/admin/settings", put(endpoints::settings::update))
        .with_state(ctx.clone())
        // Innermost first, outermost last
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/settings/public", get(endpoints::settings::public))
        .with_state(ctx.clone());

    // The maintenance gate sits on the top-level router so it sees the
    // full `/api/...` path.
    Router::new()
        .nest("/api", protected)
        .nest("/api", public)
        .layer(axum::middleware::from_fn(
            middleware::maintenance::check_maintenance,
        ))
        .layer(axum::Extension(ctx))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
}
