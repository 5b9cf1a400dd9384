//! Reconciliation Scheduler, on-demand path.
//!
//! One cycle: lock the subject → load its aggregate and credential → walk the
//! active repositories in insertion order → save the aggregate once.
//! A failing repository becomes a result line; the walk continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use keepalive_core::{
    credentials, registry, ActivityAction, ActivityLogEntry, CredentialError, MonitoredRepository,
    MonitoringSubject, StoreError, SubjectId,
};
use keepalive_host::{Credential, SourceHost};

use crate::config::ReconcileConfig;
use crate::detector::detect;
use crate::error::ReconcileError;
use crate::executor::{perform_keepalive, timed};
use crate::locks::SubjectLocks;

pub const MSG_SELF_COMMIT: &str = "New commit is from current user, skipping auto-commit";
pub const MSG_NO_NEW_COMMITS: &str = "No new commits";

/// Outcome of checking one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCheckResult {
    pub repo: String,
    /// True for every repository the walk reached, including failed ones.
    pub checked: bool,
    pub new_commit: bool,
    pub auto_commit_triggered: bool,
    pub auto_commit_success: bool,
    pub message: String,
    /// Raw failure detail when the commit fetch failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepoCheckResult {
    fn new(repo: &MonitoredRepository) -> Self {
        Self {
            repo: repo.full_name.clone(),
            checked: true,
            new_commit: false,
            auto_commit_triggered: false,
            auto_commit_success: false,
            message: String::new(),
            error: None,
        }
    }

    /// The log entry this result warrants, if anything happened.
    pub fn activity_entry(&self, at: DateTime<Utc>) -> Option<ActivityLogEntry> {
        let (action, success) = if self.auto_commit_triggered {
            let action = if self.auto_commit_success {
                ActivityAction::AutoCommitSuccess
            } else {
                ActivityAction::AutoCommitFailed
            };
            (action, self.auto_commit_success)
        } else if self.new_commit {
            (ActivityAction::CommitDetected, true)
        } else {
            return None;
        };
        Some(ActivityLogEntry::new(
            self.repo.clone(),
            action,
            self.message.clone(),
            success,
            at,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCycleReport {
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<RepoCheckResult>,
    /// Set when the requester went away and remaining repositories were skipped.
    #[serde(default)]
    pub cancelled: bool,
}

/// Shared engine handle. Cheap to clone; clones share the per-subject locks.
#[derive(Clone)]
pub struct Reconciler {
    host: Arc<dyn SourceHost>,
    config: ReconcileConfig,
    locks: SubjectLocks,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(host: Arc<dyn SourceHost>, config: ReconcileConfig) -> Self {
        Self {
            host,
            config,
            locks: SubjectLocks::default(),
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub(crate) fn host(&self) -> &dyn SourceHost {
        self.host.as_ref()
    }

    pub(crate) fn locks(&self) -> &SubjectLocks {
        &self.locks
    }

    /// Run one on-demand cycle for `subject`.
    ///
    /// Cancelling `cancel` stops the walk before the next repository; the
    /// repository in flight finishes and everything done so far is saved.
    pub async fn run_check_cycle(
        &self,
        home: &Path,
        subject: &SubjectId,
        cancel: &CancellationToken,
    ) -> Result<CheckCycleReport, ReconcileError> {
        let _guard = self.locks.acquire(subject).await;

        let mut aggregate = load_subject(home, subject).await?;
        let credential = load_credential(home, subject).await?;

        let results = self
            .reconcile_subject(&mut aggregate, &credential, Some(cancel))
            .await;
        let cancelled = cancel.is_cancelled();
        save_subject(home, aggregate).await?;

        tracing::info!(
            subject = %subject,
            repos = results.len(),
            cancelled,
            "check cycle complete"
        );
        Ok(CheckCycleReport {
            subject: subject.0.clone(),
            timestamp: Utc::now(),
            results,
            cancelled,
        })
    }

    /// Walk active repositories, mutating tracked state and the activity log
    /// in memory. The caller holds the subject lock and persists afterwards.
    pub(crate) async fn reconcile_subject(
        &self,
        subject: &mut MonitoringSubject,
        credential: &Credential,
        cancel: Option<&CancellationToken>,
    ) -> Vec<RepoCheckResult> {
        let owner = subject.owner_identity.clone();
        let mut results = Vec::new();

        for repo in subject.repositories.iter_mut().filter(|r| r.is_active) {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::info!(subject = %subject.id, "requester gone; stopping before {}", repo.full_name);
                break;
            }
            let result = self.check_repository(credential, &owner, repo).await;
            if let Some(entry) = result.activity_entry(Utc::now()) {
                subject.activity_log.record(entry);
            }
            results.push(result);
        }
        if !results.is_empty() {
            subject.updated_at = Utc::now();
        }
        results
    }

    /// IDLE → FETCHING → {NO_CHANGE | CHANGE_SELF | CHANGE_OTHER → WRITE_OK | WRITE_FAILED}.
    async fn check_repository(
        &self,
        credential: &Credential,
        owner_identity: &str,
        repo: &mut MonitoredRepository,
    ) -> RepoCheckResult {
        let slug = repo.slug();
        let mut result = RepoCheckResult::new(repo);

        let fetched = timed(
            self.config.call_timeout,
            self.host
                .list_recent_commits(credential, &slug, self.config.commit_window),
        )
        .await;
        let commits = match fetched {
            Ok(commits) => commits,
            Err(e) => {
                tracing::warn!(repo = %slug, error = %e, "commit fetch failed");
                result.message = format!("Error checking repo: {e}");
                result.error = Some(e.to_string());
                return result;
            }
        };

        let detection = detect(
            repo.last_commit_sha.as_deref(),
            &commits,
            owner_identity,
            self.config.first_observation,
        );
        let now = Utc::now();

        match detection.latest_commit.as_ref().filter(|_| detection.has_new) {
            Some(latest) => {
                result.new_commit = true;
                if detection.needs_compensation() {
                    result.auto_commit_triggered = true;
                    let outcome = perform_keepalive(
                        self.host.as_ref(),
                        credential,
                        &slug,
                        now,
                        self.config.call_timeout,
                    )
                    .await;
                    result.auto_commit_success = outcome.success;
                    result.message = outcome.message;
                    if outcome.success {
                        repo.record_compensation();
                    }
                    tracing::info!(
                        repo = %slug,
                        author = %latest.author,
                        success = outcome.success,
                        "compensating commit attempted"
                    );
                } else {
                    result.message = MSG_SELF_COMMIT.to_string();
                }
                repo.commit(&latest.sha, &latest.author, now);
            }
            None => {
                result.message = MSG_NO_NEW_COMMITS.to_string();
                repo.touch(now);
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Blocking store access
// ---------------------------------------------------------------------------

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> Result<T, ReconcileError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReconcileError::Join(e.to_string()))
}

pub(crate) async fn load_subject(
    home: &Path,
    subject: &SubjectId,
) -> Result<MonitoringSubject, ReconcileError> {
    let (home, id) = (home.to_path_buf(), subject.clone());
    blocking(move || registry::load_subject_at(&home, &id))
        .await?
        .map_err(|e| match e {
            StoreError::SubjectNotFound { subject, .. } => ReconcileError::SubjectNotFound(subject),
            other => ReconcileError::Store(other),
        })
}

pub(crate) async fn load_credential(
    home: &Path,
    subject: &SubjectId,
) -> Result<Credential, ReconcileError> {
    let (home, id) = (home.to_path_buf(), subject.clone());
    blocking(move || credentials::load_credential_at(&home, &id))
        .await?
        .map_err(|e| match e {
            CredentialError::StoreUnavailable { .. } => {
                ReconcileError::CredentialStoreUnavailable(e.to_string())
            }
            other => ReconcileError::CredentialInvalid {
                subject: subject.0.clone(),
                reason: other.to_string(),
            },
        })
}

pub(crate) async fn save_subject(
    home: &Path,
    aggregate: MonitoringSubject,
) -> Result<(), ReconcileError> {
    let home: PathBuf = home.to_path_buf();
    blocking(move || registry::save_subject_at(&home, &aggregate))
        .await?
        .map_err(ReconcileError::Store)
}

pub(crate) async fn with_store<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, ReconcileError> {
    blocking(f).await?.map_err(ReconcileError::Store)
}
