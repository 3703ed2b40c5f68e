//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Maintenance gate: 503 while the portal is down for maintenance
//! 2. Auth validator: bearer token → `Principal`
//! 3. Audit logger: logs after auth, has the principal

pub mod audit;
pub mod auth;
pub mod maintenance;
