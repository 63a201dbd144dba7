//! Alert recipient lookup and resolution.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by a recipient directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of subject contact addresses and the shared alert list.
pub trait RecipientDirectory: Send + Sync {
    /// Contact address registered for a subject, if any.
    fn lookup_primary_email(&self, subject_id: &str) -> Result<Option<String>, DirectoryError>;

    /// Addresses copied on every alert, regardless of subject.
    fn lookup_extra_recipients(&self) -> Result<Vec<String>, DirectoryError>;
}

/// Contact fields of a subject profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
}

impl Profile {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// First non-blank address, preferring the dedicated alert address.
    pub fn contact(&self) -> Option<String> {
        [&self.alert_email, &self.email, &self.mail]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Directory contents as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryDocument {
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    #[serde(default)]
    pub alert_extras: Vec<String>,
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    document: DirectoryDocument,
}

impl StaticDirectory {
    pub fn new(document: DirectoryDocument) -> Self {
        Self { document }
    }

    pub fn with_profile(mut self, subject_id: impl Into<String>, profile: Profile) -> Self {
        self.document.profiles.insert(subject_id.into(), profile);
        self
    }

    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.alert_extras = extras.into_iter().map(Into::into).collect();
        self
    }
}

impl RecipientDirectory for StaticDirectory {
    fn lookup_primary_email(&self, subject_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.document.profiles.get(subject_id).and_then(Profile::contact))
    }

    fn lookup_extra_recipients(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.document.alert_extras.clone())
    }
}

/// Directory backed by a JSON file, re-read on every lookup.
///
/// A missing file is an empty directory.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DirectoryDocument, DirectoryError> {
        if !self.path.exists() {
            return Ok(DirectoryDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl RecipientDirectory for FileDirectory {
    fn lookup_primary_email(&self, subject_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.load()?.profiles.get(subject_id).and_then(Profile::contact))
    }

    fn lookup_extra_recipients(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.load()?.alert_extras)
    }
}

/// Fallbacks applied when the directory has nothing to offer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientDefaults {
    /// Used as primary recipient when the subject has no address
    pub from_email: Option<String>,
    /// Used when the directory's shared list is empty
    pub alert_extra: Vec<String>,
}

/// Split a comma-separated address list, dropping blanks.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the ordered, duplicate-free recipient list for a subject's alert.
///
/// Directory failures are logged and treated as "nothing found".
pub fn resolve_recipients(
    directory: &dyn RecipientDirectory,
    defaults: &RecipientDefaults,
    subject_id: &str,
) -> Vec<String> {
    let primary = match directory.lookup_primary_email(subject_id) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Primary recipient lookup failed for {}: {}", subject_id, e);
            None
        }
    }
    .or_else(|| defaults.from_email.clone());

    let mut extras = match directory.lookup_extra_recipients() {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Extra recipient lookup failed: {}", e);
            Vec::new()
        }
    };
    if extras.is_empty() {
        extras = defaults.alert_extra.clone();
    }

    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(extras)
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty())
        .filter(|addr| seen.insert(addr.clone()))
        .collect()
}
