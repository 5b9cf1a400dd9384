//! Compensating Action Executor.
//!
//! Read the tracked file, append a `.` and upsert the hidden timestamp marker,
//! then write it back conditioned on a revision read *again* right before the
//! write. Failures are reported in the outcome, never retried here.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::{NoExpand, Regex};

use keepalive_host::{Credential, FileWrite, HostError, RepoSlug, SourceHost};

const MARKER_PREFIX: &str = "<!-- AutoCommit:";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- AutoCommit: .* -->").expect("valid regex"));

pub const MSG_READ_FAILED: &str = "Could not fetch README";
pub const MSG_WRITE_OK: &str = "README updated successfully";
pub const MSG_WRITE_FAILED: &str = "Failed to update README";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: String,
}

impl ExecutionOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Deterministic content transform.
///
/// A `.` goes on the end of the last line (before a single trailing newline
/// if there is one). Then the first marker is replaced with one carrying
/// `timestamp`, or a marker is appended on a new line if none exists.
pub fn apply_keepalive_marker(content: &str, timestamp: &str) -> String {
    let mut out = match content.strip_suffix('\n') {
        Some(body) => format!("{body}.\n"),
        None => format!("{content}."),
    };
    let marker = format!("<!-- AutoCommit: {timestamp} -->");
    if out.contains(MARKER_PREFIX) {
        MARKER_RE.replace(&out, NoExpand(&marker)).into_owned()
    } else {
        out.push('\n');
        out.push_str(&marker);
        out
    }
}

/// ISO-8601 UTC with milliseconds, e.g. `2026-03-01T09:30:00.000Z`.
pub fn marker_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Bound a host call; an elapsed deadline becomes [`HostError::Timeout`].
pub(crate) async fn timed<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, HostError>>,
) -> Result<T, HostError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(HostError::Timeout))
}

/// Run the read → transform → re-read → write protocol once.
pub async fn perform_keepalive(
    host: &dyn SourceHost,
    credential: &Credential,
    repo: &RepoSlug,
    now: DateTime<Utc>,
    call_timeout: Duration,
) -> ExecutionOutcome {
    let file = match timed(call_timeout, host.read_tracked_file(credential, repo)).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            tracing::debug!(repo = %repo, "tracked file not found");
            return ExecutionOutcome::failed(MSG_READ_FAILED);
        }
        Err(e) => {
            tracing::warn!(repo = %repo, error = %e, "tracked file read failed");
            return ExecutionOutcome::failed(MSG_READ_FAILED);
        }
    };

    let timestamp = marker_timestamp(now);
    let content = apply_keepalive_marker(&file.content, &timestamp);

    // The first read's revision may be stale by now.
    let revision = match timed(call_timeout, host.read_tracked_file(credential, repo)).await {
        Ok(Some(latest)) => latest.revision,
        Ok(None) => {
            return ExecutionOutcome::failed(format!(
                "{MSG_WRITE_FAILED}: file disappeared before write"
            ))
        }
        Err(e) => return ExecutionOutcome::failed(format!("{MSG_WRITE_FAILED}: {e}")),
    };

    let write = FileWrite {
        path: file.path,
        content,
        revision,
        message: format!("Auto-commit: {timestamp}"),
    };
    match timed(call_timeout, host.write_tracked_file(credential, repo, &write)).await {
        Ok(()) => ExecutionOutcome {
            success: true,
            message: MSG_WRITE_OK.to_string(),
        },
        Err(e) => {
            tracing::warn!(repo = %repo, error = %e, "keep-alive write rejected");
            ExecutionOutcome::failed(format!("{MSG_WRITE_FAILED}: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS1: &str = "2026-03-01T09:30:00.000Z";
    const TS2: &str = "2026-03-01T10:00:00.000Z";

    #[test]
    fn period_goes_before_trailing_newline() {
        let out = apply_keepalive_marker("# Title\nHello\n", TS1);
        assert_eq!(out, format!("# Title\nHello.\n\n<!-- AutoCommit: {TS1} -->"));
    }

    #[test]
    fn period_appended_without_trailing_newline() {
        let out = apply_keepalive_marker("Hello", TS1);
        assert_eq!(out, format!("Hello.\n<!-- AutoCommit: {TS1} -->"));
    }

    #[test]
    fn second_application_keeps_exactly_one_marker() {
        let once = apply_keepalive_marker("Hello\n", TS1);
        let twice = apply_keepalive_marker(&once, TS2);
        assert_eq!(twice.matches(MARKER_PREFIX).count(), 1);
        assert!(twice.contains(TS2));
        assert!(!twice.contains(TS1));
        assert_ne!(once, twice);
    }

    #[test]
    fn marker_in_the_middle_is_replaced_in_place() {
        let content = format!("top\n<!-- AutoCommit: {TS1} -->\nbottom");
        let out = apply_keepalive_marker(&content, TS2);
        assert_eq!(out, format!("top\n<!-- AutoCommit: {TS2} -->\nbottom."));
    }

    #[test]
    fn empty_document_gets_period_and_marker() {
        let out = apply_keepalive_marker("", TS1);
        assert_eq!(out, format!(".\n<!-- AutoCommit: {TS1} -->"));
    }

    #[test]
    fn timestamp_format_matches_iso_millis() {
        let now: DateTime<Utc> = "2026-03-01T09:30:00Z".parse().unwrap();
        assert_eq!(marker_timestamp(now), TS1);
    }
}
