//! Change Detector.
//!
//! Pure function over the tracked sha and a freshly fetched, newest-first
//! commit list. Only the newest commit is evaluated; older ones in the window
//! are ignored.

use keepalive_host::CommitInfo;

use crate::config::FirstObservationPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub has_new: bool,
    /// Newest remote commit, if the repository has any.
    pub latest_commit: Option<CommitInfo>,
    /// Meaningful only when `has_new`.
    pub is_from_other: bool,
}

impl Detection {
    /// `has_new && is_from_other`.
    pub fn needs_compensation(&self) -> bool {
        self.has_new && self.is_from_other
    }
}

pub fn detect(
    tracked_sha: Option<&str>,
    commits: &[CommitInfo],
    owner_identity: &str,
    policy: FirstObservationPolicy,
) -> Detection {
    let Some(latest) = commits.first() else {
        return Detection {
            has_new: false,
            latest_commit: None,
            is_from_other: false,
        };
    };
    let foreign = latest.author != owner_identity;

    let (has_new, is_from_other) = match tracked_sha {
        None => match policy {
            FirstObservationPolicy::CompensateForeignAuthor => (true, foreign),
            FirstObservationPolicy::BaselineOnly => (true, false),
        },
        Some(sha) if sha != latest.sha => (true, foreign),
        Some(_) => (false, false),
    };

    Detection {
        has_new,
        latest_commit: Some(latest.clone()),
        is_from_other,
    }
}
