//! Storage-layer types for project identity and metadata.
//!
//! [`ProjectId`] is defined here (not in notetree-core) because project
//! identity is a storage concern -- the graph itself does not know which
//! project it belongs to.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a stored project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        ProjectId(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ProjectId)
    }
}

/// A stored project: one conversation forest plus its model settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Instructions sent with every generation in this project.
    pub system_prompt: String,
    /// Model identifier passed to the transport.
    pub model: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; bumped on every save.
    pub last_modified: i64,
}

/// Partial update of a project's settings.
///
/// Fields left as `None` are unchanged. Applying an empty update only bumps
/// `last_modified`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.system_prompt.is_none() && self.model.is_none()
    }
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A `last_modified` value strictly after `previous`.
pub(crate) fn bump(previous: i64) -> i64 {
    now_millis().max(previous + 1)
}
