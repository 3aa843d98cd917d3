//! Row models
//!
//! One struct per table, decoded with `sqlx::FromRow` and serialized as-is by
//! the HTTP API. Composite views (module with jacks, rack with modules) live
//! in the service crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Where a rack's (or a module record's) data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Parsed from real page content
    Extracted,
    /// Placeholder/default substitution after a failure
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Extracted => "extracted",
            Provenance::Fallback => "fallback",
        }
    }

    /// Parse the stored column value; anything unrecognized reads as fallback
    pub fn from_db(value: &str) -> Self {
        match value {
            "extracted" => Provenance::Extracted,
            _ => Provenance::Fallback,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesizer module, unique on (name, manufacturer)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    pub manufacturer: String,
    pub hp_width: Option<i64>,
    pub module_type: Option<String>,
    pub description: Option<String>,
    pub manual_url: Option<String>,
    /// Cached manual text, served by the manual endpoint only
    #[serde(skip_serializing)]
    pub manual_content: Option<String>,
    #[serde(skip_serializing)]
    pub manual_last_updated: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub modulargrid_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Physical jack on a module
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleConnection {
    pub id: i64,
    pub module_id: i64,
    pub name: String,
    /// "input" or "output"
    pub connection_type: String,
    pub description: Option<String>,
}

/// Knob, switch or button on a module
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleControl {
    pub id: i64,
    pub module_id: i64,
    pub control_type: String,
    pub control_name: String,
    pub description: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub default_value: Option<f64>,
    pub is_attenuator: bool,
    pub is_attenuverter: bool,
}

/// Rack imported from ModularGrid
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRack {
    pub id: i64,
    pub modulargrid_url: String,
    pub modulargrid_id: Option<String>,
    pub rack_name: Option<String>,
    pub provenance: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl UserRack {
    pub fn provenance(&self) -> Provenance {
        Provenance::from_db(&self.provenance)
    }
}

/// Placement of a module inside a rack
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RackModule {
    pub id: i64,
    pub rack_id: i64,
    pub module_id: i64,
    pub position_x: Option<i64>,
    pub position_y: Option<i64>,
}

/// Generated or imported patch suggestion
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatchIdea {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub patch_type: Option<String>,
    pub complexity: Option<i64>,
    pub source_type: Option<String>,
    pub source_url: Option<String>,
    pub source_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatchModule {
    pub id: i64,
    pub patch_id: i64,
    pub module_id: i64,
    pub role: Option<String>,
    pub importance: Option<i64>,
}

/// Cable between two module jacks
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatchConnection {
    pub id: i64,
    pub patch_id: i64,
    pub source_module_id: i64,
    pub source_connection_id: Option<i64>,
    pub source_jack: String,
    pub target_module_id: i64,
    pub target_connection_id: Option<i64>,
    pub target_jack: String,
    pub cable_color: Option<String>,
    pub description: Option<String>,
    pub importance: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PatchControlSetting {
    pub id: i64,
    pub patch_id: i64,
    pub module_id: i64,
    pub control_id: Option<i64>,
    pub control_name: String,
    pub value_numeric: Option<f64>,
    pub value_text: Option<String>,
    pub description: Option<String>,
    pub importance: Option<i64>,
}

/// Scraped forum thread mentioning a module
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumSource {
    pub id: i64,
    pub source_type: String,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub module_id: Option<i64>,
    pub scraped_at: DateTime<Utc>,
    pub relevance_score: Option<f64>,
}
