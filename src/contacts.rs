//! Contact Directory Loader
//!
//! Reads the device contact directory (names, phone numbers, emails) and
//! returns it sorted by display name. Permission denial and platform read
//! failures degrade to an empty directory instead of an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::notice::{Notice, PermissionScope, PermissionStatus, PlatformError};
use crate::phone::numbers_match;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhoneEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub email: String,
}

/// One directory entry. Snapshots are replaced wholesale on every load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneEntry>,
    #[serde(default)]
    pub emails: Vec<EmailEntry>,
}

impl ContactRecord {
    /// Name used for sorting and display; empty when the entry has none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn primary_number(&self) -> Option<&str> {
        self.phone_numbers.first().map(|p| p.number.as_str())
    }

    /// True if any stored number normalizes to the same digits as `number`.
    pub fn has_number(&self, number: &str) -> bool {
        self.phone_numbers.iter().any(|p| numbers_match(&p.number, number))
    }
}

/// Device contact store
#[async_trait]
pub trait ContactsPlatform: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError>;
    /// Entries with name, phone and email fields populated.
    async fn read_contacts(&self) -> Result<Vec<ContactRecord>, PlatformError>;
}

/// Outcome of a directory load
#[derive(Debug, Clone, Default)]
pub struct ContactLoad {
    pub contacts: Vec<ContactRecord>,
    pub notice: Option<Notice>,
}

pub struct ContactDirectoryLoader {
    platform: Arc<dyn ContactsPlatform>,
}

impl ContactDirectoryLoader {
    pub fn new(platform: Arc<dyn ContactsPlatform>) -> Self {
        Self { platform }
    }

    pub async fn load(&self) -> ContactLoad {
        let status = match self.platform.request_permission().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Contacts permission request failed");
                return ContactLoad::default();
            }
        };

        if !status.is_granted() {
            warn!("Contacts permission denied");
            return ContactLoad {
                contacts: Vec::new(),
                notice: Some(Notice::PermissionDenied(PermissionScope::Contacts)),
            };
        }

        match self.platform.read_contacts().await {
            Ok(mut contacts) => {
                sort_by_display_name(&mut contacts);
                info!(count = contacts.len(), "Loaded contact directory");
                ContactLoad { contacts, notice: None }
            }
            Err(e) => {
                error!(error = %e, "Error fetching contacts");
                ContactLoad::default()
            }
        }
    }
}

/// Case- and accent-insensitive key approximating a locale-aware compare.
fn collation_key(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Sort ascending by display name. Missing names sort as "" (first).
pub fn sort_by_display_name(contacts: &mut [ContactRecord]) {
    contacts.sort_by_cached_key(|c| {
        (collation_key(c.display_name()), c.display_name().to_string(), c.id.clone())
    });
}
