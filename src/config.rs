//! Screen configuration
//!
//! Defaults, then `config/preferences.json` under the app data directory,
//! then environment overrides. Passed explicitly into the screen; nothing
//! reads it from global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::calllog::DEFAULT_CALL_LOG_LIMIT;
use crate::leads::FetchLeadsRequest;
use crate::session::{OpenSessionPolicy, HISTORY_CAPACITY};

/// Application identifier used for the data directory
const APP_IDENTIFIER: &str = "com.calldesk.app";

pub const DEFAULT_API_BASE_URL: &str = "https://crm-s1.amiigo.in/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("App data directory not found")]
    NoAppDataDir,
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenConfig {
    pub api_base_url: String,
    pub lead_page: u32,
    pub lead_limit: u32,
    pub unassigned_only: bool,
    pub call_log_limit: usize,
    pub history_capacity: usize,
    pub open_session_policy: OpenSessionPolicy,
    /// Unset means the lead request may wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            lead_page: 1,
            lead_limit: 50,
            unassigned_only: false,
            call_log_limit: DEFAULT_CALL_LOG_LIMIT,
            history_capacity: HISTORY_CAPACITY,
            open_session_policy: OpenSessionPolicy::Reject,
            request_timeout_secs: None,
        }
    }
}

impl ScreenConfig {
    pub fn lead_request(&self) -> FetchLeadsRequest {
        FetchLeadsRequest {
            page: self.lead_page,
            limit: self.lead_limit,
            unassigned_only: self.unassigned_only,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Read a preferences file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No preferences file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `CALLDESK_*` overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CALLDESK_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup("CALLDESK_LEAD_LIMIT") {
            match raw.trim().parse() {
                Ok(limit) => self.lead_limit = limit,
                Err(_) => warn!(value = %raw, "Ignoring invalid CALLDESK_LEAD_LIMIT"),
            }
        }
    }

    /// Defaults, the user's preferences file, then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&preferences_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }
}

pub fn get_app_data_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir().ok_or(ConfigError::NoAppDataDir)?;
    Ok(base.join(APP_IDENTIFIER))
}

pub fn preferences_path() -> Result<PathBuf, ConfigError> {
    Ok(get_app_data_dir()?.join("config").join("preferences.json"))
}

/// Write to a .tmp sibling then rename into place.
fn atomic_write(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Create `<base>/config` and default preferences if absent.
pub fn init_app_data_dir(base: &Path) -> Result<PathBuf, ConfigError> {
    let config_dir = base.join("config");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    let prefs_path = config_dir.join("preferences.json");
    if !prefs_path.exists() {
        let content = serde_json::to_string_pretty(&ScreenConfig::default())?;
        atomic_write(&prefs_path, &content)?;
    }
    Ok(prefs_path)
}
