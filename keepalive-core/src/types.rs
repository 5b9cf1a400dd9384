//! Domain types for the keepalive subject registry.
//!
//! A [`MonitoringSubject`] is the unit of persistence: its repository list and
//! activity log are always written back together as one document.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityLog;
use crate::error::StoreError;

/// Default advisory poll interval for a new subject.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
/// Lower bound accepted by [`MonitoringSubject::set_poll_interval`].
pub const MIN_POLL_INTERVAL_MS: u64 = 10_000;
/// Upper bound accepted by [`MonitoringSubject::set_poll_interval`].
pub const MAX_POLL_INTERVAL_MS: u64 = 300_000;

const MAX_OWNER_LEN: usize = 39;
const MAX_NAME_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed subject identifier (the owner's handle on the source host).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Validate a handle before it is used as a file name.
    pub fn parse(handle: &str) -> Result<Self, StoreError> {
        let handle = handle.trim();
        if handle.is_empty() || handle.len() > MAX_OWNER_LEN || !is_slug_segment(handle) {
            return Err(StoreError::InvalidSubject(handle.to_string()));
        }
        Ok(Self(handle.to_string()))
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// `owner/name` pair addressing one repository on the source host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Build a slug, validating both segments.
    pub fn new(owner: &str, name: &str) -> Result<Self, StoreError> {
        let owner = owner.trim();
        let name = name.trim();
        if !Self::is_valid(owner, name) {
            return Err(StoreError::InvalidRepository(format!("{owner}/{name}")));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// `owner` ≤ 39 chars, `name` ≤ 100 chars, both `[A-Za-z0-9_.-]+`.
    pub fn is_valid(owner: &str, name: &str) -> bool {
        !owner.is_empty()
            && owner.len() <= MAX_OWNER_LEN
            && !name.is_empty()
            && name.len() <= MAX_NAME_LEN
            && is_slug_segment(owner)
            && is_slug_segment(name)
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoSlug {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((owner, name)) = s.trim().split_once('/') else {
            return Err(StoreError::InvalidRepository(s.to_string()));
        };
        Self::new(owner, name)
    }
}

/// Host access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

fn is_slug_segment(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One repository watched on behalf of a subject.
///
/// The `last_commit_*` and `last_checked_at` fields are the tracked state
/// carried between check cycles; see [`crate::tracker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredRepository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_commit_sha: Option<String>,
    #[serde(default)]
    pub last_commit_author: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_commit_count: u64,
}

impl MonitoredRepository {
    /// A fresh, active repository with no tracked state.
    pub fn new(slug: &RepoSlug, full_name: impl Into<String>) -> Self {
        Self {
            owner: slug.owner.clone(),
            name: slug.name.clone(),
            full_name: full_name.into(),
            is_active: true,
            last_commit_sha: None,
            last_commit_author: None,
            last_checked_at: None,
            auto_commit_count: 0,
        }
    }

    pub fn slug(&self) -> RepoSlug {
        RepoSlug {
            owner: self.owner.clone(),
            name: self.name.clone(),
        }
    }

    pub fn matches(&self, slug: &RepoSlug) -> bool {
        self.owner == slug.owner && self.name == slug.name
    }
}

/// The per-subject aggregate: identity, monitoring gate, repositories, and log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSubject {
    pub id: SubjectId,
    /// Handle compared against commit authors.
    pub owner_identity: String,
    #[serde(default)]
    pub is_monitoring_enabled: bool,
    /// Advisory only; the external trigger decides actual cadence.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub repositories: Vec<MonitoredRepository>,
    #[serde(default)]
    pub activity_log: ActivityLog,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoringSubject {
    pub fn new(id: SubjectId, owner_identity: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_identity: owner_identity.into(),
            is_monitoring_enabled: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            repositories: Vec::new(),
            activity_log: ActivityLog::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn repository(&self, slug: &RepoSlug) -> Option<&MonitoredRepository> {
        self.repositories.iter().find(|r| r.matches(slug))
    }

    pub fn repository_mut(&mut self, slug: &RepoSlug) -> Option<&mut MonitoredRepository> {
        self.repositories.iter_mut().find(|r| r.matches(slug))
    }

    /// Count of repositories that participate in check cycles.
    pub fn active_repository_count(&self) -> usize {
        self.repositories.iter().filter(|r| r.is_active).count()
    }

    /// Sum of successful compensating writes across all repositories.
    pub fn total_auto_commits(&self) -> u64 {
        self.repositories.iter().map(|r| r.auto_commit_count).sum()
    }

    /// Apply `interval_ms` if it lies in 10 000–300 000; otherwise keep the
    /// current value. Returns whether the value was applied.
    pub fn set_poll_interval(&mut self, interval_ms: u64) -> bool {
        if (MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&interval_ms) {
            self.poll_interval_ms = interval_ms;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_parse_and_display() {
        let slug: RepoSlug = "octo-org/hello.world".parse().expect("parse");
        assert_eq!(slug.owner, "octo-org");
        assert_eq!(slug.name, "hello.world");
        assert_eq!(slug.to_string(), "octo-org/hello.world");
        assert_eq!(slug.full_name(), "octo-org/hello.world");
    }

    #[test]
    fn slug_rejects_bad_segments() {
        assert!("no-slash".parse::<RepoSlug>().is_err());
        assert!("owner/".parse::<RepoSlug>().is_err());
        assert!("own er/repo".parse::<RepoSlug>().is_err());
        assert!("owner/<script>".parse::<RepoSlug>().is_err());
        let long_owner = "a".repeat(40);
        assert!(RepoSlug::new(&long_owner, "repo").is_err());
        let long_name = "b".repeat(101);
        assert!(RepoSlug::new("owner", &long_name).is_err());
    }

    #[test]
    fn subject_id_validation() {
        assert_eq!(SubjectId::parse(" alice ").expect("parse").0, "alice");
        assert!(SubjectId::parse("").is_err());
        assert!(SubjectId::parse("../etc").is_err());
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = Credential::new("ghp_secret");
        assert_eq!(format!("{cred:?}"), "Credential(***)");
        assert_eq!(cred.expose(), "ghp_secret");
    }

    #[test]
    fn poll_interval_outside_range_is_ignored() {
        let mut subject = MonitoringSubject::new(SubjectId::from("alice"), "alice", Utc::now());
        assert!(!subject.set_poll_interval(5_000));
        assert_eq!(subject.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(subject.set_poll_interval(60_000));
        assert_eq!(subject.poll_interval_ms, 60_000);
        assert!(!subject.set_poll_interval(300_001));
        assert_eq!(subject.poll_interval_ms, 60_000);
    }

    #[test]
    fn repository_defaults_when_fields_missing() {
        let yaml = "owner: a\nname: b\nfull_name: a/b\n";
        let repo: MonitoredRepository = serde_yaml::from_str(yaml).expect("deserialize");
        assert!(repo.is_active);
        assert_eq!(repo.auto_commit_count, 0);
        assert!(repo.last_commit_sha.is_none());
    }
}
