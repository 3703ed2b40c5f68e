//! Portal HTTP API.
//!
//! Exposes the appointment workflow as JSON endpoints. Routes are nested
//! under `/api/`; protected routes pass Maintenance → Auth → Audit →
//! Handler.
//!
//! The router is composable: `api_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_server, ServerError, ServerHandle, ServerInfo};
pub use types::ApiContext;
