//! Pull-through cache for the portal-wide settings row.
//!
//! Owned by the API context and handed to middleware and handlers; there
//! is no process-global instance. A failed refresh serves defaults
//! (maintenance off) and is retried on the next read.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::SystemSettings;

/// Default time-to-live for cached settings.
pub const DEFAULT_SETTINGS_TTL: Duration = Duration::from_secs(60);

struct Cached {
    value: SystemSettings,
    fetched_at: Instant,
}

pub struct SettingsCache {
    inner: Mutex<Option<Cached>>,
    ttl: Duration,
}

impl SettingsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Cached>> {
        // Cached settings stay valid even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value if still fresh, otherwise the result of `fetch`.
    pub fn get_or_refresh<F, E>(&self, fetch: F) -> SystemSettings
    where
        F: FnOnce() -> Result<SystemSettings, E>,
        E: Display,
    {
        let mut guard = self.lock();
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.value.clone();
            }
        }

        match fetch() {
            Ok(value) => {
                *guard = Some(Cached {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                value
            }
            Err(e) => {
                tracing::warn!("Settings refresh failed, serving defaults: {e}");
                *guard = None;
                SystemSettings::default()
            }
        }
    }

    /// Drop the cached value so the next read fetches.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_TTL)
    }
}
