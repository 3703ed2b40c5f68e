//! Shared service state: database location, token signer and the
//! notification dispatcher. Wrapped in `Arc` at startup and handed to the
//! HTTP layer; every request opens its own SQLite connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::authorization::TokenSigner;
use crate::config::ServerConfig;
use crate::db;
use crate::notifications::{NotificationDispatcher, WebhookChannel};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    signer: TokenSigner,
    dispatcher: NotificationDispatcher,
}

impl CoreState {
    pub fn new(db_path: PathBuf, signer: TokenSigner, dispatcher: NotificationDispatcher) -> Self {
        Self {
            db_path,
            signer,
            dispatcher,
        }
    }

    /// Build from server configuration, wiring the webhook channel when set.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut dispatcher = NotificationDispatcher::new();
        if let Some(url) = &config.notify_webhook {
            dispatcher = dispatcher.with_channel(Arc::new(WebhookChannel::new(url.clone())));
        }
        Self::new(
            config.db_path.clone(),
            TokenSigner::new(config.jwt_secret.as_bytes()),
            dispatcher,
        )
    }

    /// Create the data directory and bring the schema up to date.
    pub fn initialize(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = db::open_database(&self.db_path)?;
        tracing::info!(
            path = %self.db_path.display(),
            version = db::get_current_version(&conn),
            "Database ready"
        );
        Ok(())
    }

    /// Open a database connection. Most common operation in handlers.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
