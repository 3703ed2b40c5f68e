use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Government service offered at centers. Owned by the admin catalogue;
/// the appointment workflow only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub fee: f64,
    pub processing_time: Option<String>,
    pub required_documents: Vec<RequiredDocument>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredDocument {
    pub name: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}
