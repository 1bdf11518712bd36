//! Remote Lead List
//!
//! Authenticated, paginated lead fetch against the CRM backend. The cached
//! lead set is replaced wholesale on every successful fetch and left alone
//! on failure.

pub mod client;
pub mod source;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub use client::{FetchLeadsRequest, HttpLeadsApi, LeadError, LeadsApi, FETCH_LEADS_PATH};
pub use source::{LeadSource, SessionTokenProvider, StaticTokenProvider};

/// Pipeline status. Unrecognized server values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LeadStatus {
    #[default]
    Pending,
    Contacted,
    Qualified,
    Converted,
    Lost,
    Other(String),
}

impl LeadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
            LeadStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for LeadStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "new" => LeadStatus::Pending,
            "contacted" => LeadStatus::Contacted,
            "qualified" => LeadStatus::Qualified,
            "converted" => LeadStatus::Converted,
            "lost" => LeadStatus::Lost,
            _ => LeadStatus::Other(raw.to_string()),
        }
    }
}

impl Serialize for LeadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LeadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(LeadStatus::from).unwrap_or_default())
    }
}

/// Priority arrives as either a label ("high") or a number (3).
fn priority_from_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Lead as returned by `POST /leads/fetch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "WireLead")]
pub struct LeadRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub phone_number: String,
    pub email: Option<String>,
    pub status: LeadStatus,
    pub priority: Option<String>,
}

/// Server shape. Mongo-backed responses may carry `_id`, `id`, or both.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLead {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    status: LeadStatus,
    #[serde(default, deserialize_with = "priority_from_value")]
    priority: Option<String>,
}

impl From<WireLead> for LeadRecord {
    fn from(wire: WireLead) -> Self {
        Self {
            id: wire.id.filter(|id| !id.is_empty()).or(wire.object_id),
            name: wire.name,
            phone_number: wire.phone_number,
            email: wire.email,
            status: wire.status,
            priority: wire.priority,
        }
    }
}

impl LeadRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}
