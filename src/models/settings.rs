use serde::{Deserialize, Serialize};

/// Portal-wide switches. A single row in `system_settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    pub estimated_downtime: Option<String>,
}
