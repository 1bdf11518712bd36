//! Device Call History
//!
//! Reads the most recent call-log rows on platforms that expose them and
//! correlates each row with a loaded contact by normalized phone number.
//! Platforms without call-history access return an empty log plus a
//! `PlatformUnsupported` notice; that is expected behavior, not a retryable
//! failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::contacts::ContactRecord;
use crate::notice::{Notice, PermissionScope, PermissionStatus, PlatformError};
use crate::session::PartyRef;

/// Default number of rows read
pub const DEFAULT_CALL_LOG_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
    Missed,
    Unknown,
}

impl CallDirection {
    /// Map a platform type string (`INCOMING`, `outgoing`, ...).
    pub fn from_platform(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incoming" => CallDirection::Incoming,
            "outgoing" => CallDirection::Outgoing,
            "missed" => CallDirection::Missed,
            _ => CallDirection::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CallDirection::Incoming => "Incoming",
            CallDirection::Outgoing => "Outgoing",
            CallDirection::Missed => "Missed",
            CallDirection::Unknown => "Unknown",
        }
    }
}

/// Row as handed over by the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawCallRow {
    pub phone_number: String,
    pub date_time: DateTime<Utc>,
    pub duration: u64,
    #[serde(rename = "type")]
    pub call_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallLogEntry {
    pub number: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: u64,
    pub direction: CallDirection,
    /// First directory contact with a matching number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<PartyRef>,
}

impl From<RawCallRow> for CallLogEntry {
    fn from(row: RawCallRow) -> Self {
        Self {
            direction: CallDirection::from_platform(&row.call_type),
            number: row.phone_number,
            timestamp: row.date_time,
            duration_secs: row.duration,
            contact: None,
        }
    }
}

/// User-facing explanation shown with the permission prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRationale {
    pub title: String,
    pub message: String,
    pub button_positive: String,
    pub button_negative: String,
    pub button_neutral: String,
}

impl Default for PermissionRationale {
    fn default() -> Self {
        Self {
            title: "Call Log Permission".to_string(),
            message: "This app needs access to your call log to show your recent calls".to_string(),
            button_positive: "OK".to_string(),
            button_negative: "Cancel".to_string(),
            button_neutral: "Ask Me Later".to_string(),
        }
    }
}

#[async_trait]
pub trait CallLogPlatform: Send + Sync {
    /// Whether this platform exposes call history at all
    fn supports_call_history(&self) -> bool;

    async fn request_permission(
        &self,
        rationale: &PermissionRationale,
    ) -> Result<PermissionStatus, PlatformError>;

    /// Most recent rows first
    async fn read_recent(&self, limit: usize) -> Result<Vec<RawCallRow>, PlatformError>;
}

/// Outcome of a call-log load
#[derive(Debug, Clone, Default)]
pub struct CallLogLoad {
    pub entries: Vec<CallLogEntry>,
    pub notice: Option<Notice>,
}

pub struct CallLogSource {
    platform: Arc<dyn CallLogPlatform>,
    rationale: PermissionRationale,
}

impl CallLogSource {
    pub fn new(platform: Arc<dyn CallLogPlatform>) -> Self {
        Self {
            platform,
            rationale: PermissionRationale::default(),
        }
    }

    pub fn with_rationale(mut self, rationale: PermissionRationale) -> Self {
        self.rationale = rationale;
        self
    }

    /// Read up to `limit` rows, uncorrelated.
    pub async fn load(&self, limit: usize) -> CallLogLoad {
        if !self.platform.supports_call_history() {
            info!("Call history not available on this platform");
            return CallLogLoad {
                entries: Vec::new(),
                notice: Some(Notice::PlatformUnsupported),
            };
        }

        match self.platform.request_permission(&self.rationale).await {
            Ok(PermissionStatus::Granted) => {}
            Ok(PermissionStatus::Denied) => {
                warn!("Call Log permission denied");
                return CallLogLoad {
                    entries: Vec::new(),
                    notice: Some(Notice::PermissionDenied(PermissionScope::CallLog)),
                };
            }
            Err(e) => {
                error!(error = %e, "Error requesting call log permission");
                return CallLogLoad::default();
            }
        }

        match self.platform.read_recent(limit).await {
            Ok(rows) => {
                let entries: Vec<CallLogEntry> =
                    rows.into_iter().take(limit).map(CallLogEntry::from).collect();
                info!(count = entries.len(), "Loaded call log");
                CallLogLoad { entries, notice: None }
            }
            Err(e) => {
                error!(error = %e, "Error loading call logs");
                CallLogLoad::default()
            }
        }
    }

    /// Read and correlate against the currently loaded directory.
    pub async fn load_correlated(&self, limit: usize, contacts: &[ContactRecord]) -> CallLogLoad {
        let mut load = self.load(limit).await;
        correlate(&mut load.entries, contacts);
        load
    }
}

/// Attach the first contact whose number normalizes to the entry's number.
/// Entries without a match are left with no contact.
pub fn correlate(entries: &mut [CallLogEntry], contacts: &[ContactRecord]) {
    let mut matched = 0usize;
    for entry in entries.iter_mut() {
        entry.contact = contacts
            .iter()
            .find(|c| c.has_number(&entry.number))
            .map(|c| PartyRef {
                id: Some(c.id.clone()),
                name: c.name.clone(),
            });
        if entry.contact.is_some() {
            matched += 1;
        }
    }
    debug!(entries = entries.len(), matched, "Correlated call log");
}
