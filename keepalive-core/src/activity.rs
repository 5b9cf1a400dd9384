//! Activity Recorder: a bounded, most-recent-first outcome log.
//!
//! New entries go to the head. Once the log holds [`ACTIVITY_LOG_CAPACITY`]
//! entries, the oldest are dropped, never archived.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of entries retained per subject.
pub const ACTIVITY_LOG_CAPACITY: usize = 50;

/// `repo` value for entries that are not about one repository.
pub const SYSTEM_REPO: &str = "System";

/// Fixed action labels. Serialized as the human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    #[serde(rename = "Auto-Commit Success")]
    AutoCommitSuccess,
    #[serde(rename = "Auto-Commit Failed")]
    AutoCommitFailed,
    /// New commit authored by the owner; nothing written.
    #[serde(rename = "Commit Detected")]
    CommitDetected,
    #[serde(rename = "Repository Added")]
    RepositoryAdded,
    #[serde(rename = "Repository Removed")]
    RepositoryRemoved,
    #[serde(rename = "Background Monitoring Enabled")]
    MonitoringEnabled,
    #[serde(rename = "Background Monitoring Disabled")]
    MonitoringDisabled,
    #[serde(rename = "Monitoring Toggle Failed")]
    MonitoringToggleFailed,
    #[serde(rename = "Poll Error")]
    PollError,
}

impl ActivityAction {
    pub fn label(self) -> &'static str {
        match self {
            ActivityAction::AutoCommitSuccess => "Auto-Commit Success",
            ActivityAction::AutoCommitFailed => "Auto-Commit Failed",
            ActivityAction::CommitDetected => "Commit Detected",
            ActivityAction::RepositoryAdded => "Repository Added",
            ActivityAction::RepositoryRemoved => "Repository Removed",
            ActivityAction::MonitoringEnabled => "Background Monitoring Enabled",
            ActivityAction::MonitoringDisabled => "Background Monitoring Disabled",
            ActivityAction::MonitoringToggleFailed => "Monitoring Toggle Failed",
            ActivityAction::PollError => "Poll Error",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable outcome record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Repository full name, or [`SYSTEM_REPO`].
    pub repo: String,
    pub action: ActivityAction,
    pub message: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        repo: impl Into<String>,
        action: ActivityAction,
        message: impl Into<String>,
        success: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            repo: repo.into(),
            action,
            message: message.into(),
            success,
            timestamp,
        }
    }

    pub fn system(
        action: ActivityAction,
        message: impl Into<String>,
        success: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(SYSTEM_REPO, action, message, success, timestamp)
    }
}

/// Most-recent-first ring of [`ActivityLogEntry`].
///
/// Deserializing an oversized list truncates it to capacity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ActivityLogEntry>", into = "Vec<ActivityLogEntry>")]
pub struct ActivityLog {
    entries: VecDeque<ActivityLogEntry>,
}

impl ActivityLog {
    /// Prepend `entry`, discarding whatever falls past capacity.
    pub fn record(&mut self, entry: ActivityLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(ACTIVITY_LOG_CAPACITY);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityLogEntry> {
        self.entries.front()
    }
}

impl From<Vec<ActivityLogEntry>> for ActivityLog {
    fn from(mut entries: Vec<ActivityLogEntry>) -> Self {
        entries.truncate(ACTIVITY_LOG_CAPACITY);
        Self {
            entries: entries.into(),
        }
    }
}

impl From<ActivityLog> for Vec<ActivityLogEntry> {
    fn from(log: ActivityLog) -> Self {
        log.entries.into()
    }
}
