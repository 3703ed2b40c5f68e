use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;

use crate::settings_cache::DEFAULT_SETTINGS_TTL;

/// Application-level constants
pub const APP_NAME: &str = "Akshaya Portal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Get the application data directory
/// Platform data dir (falls back to the home dir, then the working dir).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("akshaya-portal")
}

/// Default SQLite database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("akshaya.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,akshaya_lib=debug,tower_http=info"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub settings_ttl: Duration,
    pub notify_webhook: Option<String>,
}

impl ServerConfig {
    /// Read `AKSHAYA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("AKSHAYA_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "AKSHAYA_BIND",
            value: bind_raw.clone(),
        })?;

        let settings_ttl = match get("AKSHAYA_SETTINGS_TTL_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::Invalid {
                key: "AKSHAYA_SETTINGS_TTL_SECS",
                value: raw.clone(),
            })?),
            None => DEFAULT_SETTINGS_TTL,
        };

        let jwt_secret = match get("AKSHAYA_JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "AKSHAYA_JWT_SECRET not set, using a per-process secret; tokens will not survive a restart"
                );
                generate_secret()
            }
        };

        Ok(Self {
            bind,
            db_path: get("AKSHAYA_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            jwt_secret,
            settings_ttl,
            notify_webhook: get("AKSHAYA_NOTIFY_WEBHOOK"),
        })
    }
}

/// Random signing secret (URL-safe base64, 32 bytes of entropy).
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
