//! Commit State Tracker.
//!
//! Per repository, three fields survive between check cycles: the last
//! observed commit sha, its author, and when the repository was last checked.
//! [`MonitoredRepository::observe`] is a pure read; the mutators overwrite
//! unconditionally and are only called by the scheduler that owns the cycle.

use chrono::{DateTime, Utc};

use crate::types::MonitoredRepository;

/// Snapshot of the last commit seen on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackedCommit {
    pub sha: Option<String>,
    pub author: Option<String>,
}

impl MonitoredRepository {
    pub fn observe(&self) -> TrackedCommit {
        TrackedCommit {
            sha: self.last_commit_sha.clone(),
            author: self.last_commit_author.clone(),
        }
    }

    /// Overwrite sha, author, and checked-at in one step.
    pub fn commit(&mut self, sha: &str, author: &str, checked_at: DateTime<Utc>) {
        self.last_commit_sha = Some(sha.to_string());
        self.last_commit_author = Some(author.to_string());
        self.last_checked_at = Some(checked_at);
    }

    /// Liveness update for a cycle that fetched successfully but saw no commit.
    pub fn touch(&mut self, checked_at: DateTime<Utc>) {
        self.last_checked_at = Some(checked_at);
    }

    /// Count one successful compensating write.
    pub fn record_compensation(&mut self) {
        self.auto_commit_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoSlug;

    fn repo() -> MonitoredRepository {
        let slug = RepoSlug::new("alice", "notes").expect("slug");
        MonitoredRepository::new(&slug, "alice/notes")
    }

    #[test]
    fn observe_reflects_commit() {
        let mut r = repo();
        assert_eq!(r.observe(), TrackedCommit::default());

        let now = Utc::now();
        r.commit("def", "bob", now);
        assert_eq!(
            r.observe(),
            TrackedCommit {
                sha: Some("def".into()),
                author: Some("bob".into()),
            }
        );
        assert_eq!(r.last_checked_at, Some(now));
        assert_eq!(r.auto_commit_count, 0, "commit must not touch the counter");
    }

    #[test]
    fn touch_only_moves_checked_at() {
        let mut r = repo();
        r.commit("abc", "alice", Utc::now());
        let before = r.observe();
        let later = Utc::now() + chrono::Duration::seconds(30);
        r.touch(later);
        assert_eq!(r.observe(), before);
        assert_eq!(r.last_checked_at, Some(later));
    }

    #[test]
    fn compensation_increments_by_one() {
        let mut r = repo();
        r.record_compensation();
        r.record_compensation();
        assert_eq!(r.auto_commit_count, 2);
    }
}
