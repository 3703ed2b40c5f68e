//! Shared types for the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use crate::core_state::{CoreError, CoreState};
use crate::db;
use crate::models::SystemSettings;
use crate::settings_cache::SettingsCache;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `CoreState` plus API-specific caches.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub settings: Arc<SettingsCache>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>, settings_ttl: Duration) -> Self {
        Self {
            core,
            settings: Arc::new(SettingsCache::new(settings_ttl)),
        }
    }

    /// Current portal settings through the cache.
    pub fn system_settings(&self) -> SystemSettings {
        self.settings.get_or_refresh(|| -> Result<SystemSettings, CoreError> {
            let conn = self.core.open_db()?;
            Ok(db::get_system_settings(&conn)?)
        })
    }
}
