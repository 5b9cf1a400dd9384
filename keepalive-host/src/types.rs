//! Data crossing the [`crate::SourceHost`] boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    /// Host login, else the git author name, else `"Unknown"`.
    pub author: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

/// Decoded tracked-file content plus its content-addressed revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: String,
    pub content: String,
    pub revision: String,
}

/// A full-content replacement of the tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
    /// Revision the write is conditioned on.
    pub revision: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
}
