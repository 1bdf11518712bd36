//! User-visible notices
//!
//! Nothing in the screen core is fatal. Each failure degrades to an empty or
//! stale collection and produces exactly one `Notice` for the UI to show.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which collaborator a permission prompt was for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionScope {
    Contacts,
    CallLog,
}

/// Single request/response outcome of a permission prompt.
/// Partial grants are not modeled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// Failure reported by a device collaborator (contact store, call log)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Platform read failed: {0}")]
    ReadFailed(String),
    #[error("Permission request failed: {0}")]
    PermissionRequest(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Notice {
    #[error("{}", permission_message(.0))]
    PermissionDenied(PermissionScope),
    #[error("Failed to fetch leads: {0}")]
    RemoteError(String),
    #[error("Call history access is not available on this platform")]
    PlatformUnsupported,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Failed to make call: {0}")]
    DialFailed(String),
}

fn permission_message(scope: &PermissionScope) -> &'static str {
    match scope {
        PermissionScope::Contacts => "Contacts permission is required to show your contacts",
        PermissionScope::CallLog => "Call Log permission is required to show recent calls",
    }
}

impl Serialize for Notice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
