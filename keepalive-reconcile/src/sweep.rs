//! Reconciliation Scheduler, periodic sweep path.
//!
//! Every monitoring-enabled subject gets one pass of the on-demand walk.
//! Failures stay inside that subject's result; only an unreadable registry or
//! a missing credential store stops the sweep as a whole.

use std::path::Path;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use keepalive_core::{credentials, registry, SubjectId};

use crate::cycle::{load_credential, load_subject, save_subject, Reconciler};
use crate::error::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSweepResult {
    pub subject: String,
    pub repos_checked: usize,
    pub auto_commits_triggered: usize,
    pub auto_commits_successful: usize,
    pub errors: Vec<String>,
}

impl SubjectSweepResult {
    fn new(subject: &SubjectId) -> Self {
        Self {
            subject: subject.0.clone(),
            repos_checked: 0,
            auto_commits_triggered: 0,
            auto_commits_successful: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub timestamp: DateTime<Utc>,
    pub users_processed: usize,
    pub total_auto_commits: usize,
    pub results: Vec<SubjectSweepResult>,
}

/// Stops at the first monitoring-enabled subject. Unreadable subject files
/// are reported later by the per-subject pass.
fn any_monitoring_enabled(home: &Path, ids: &[SubjectId]) -> bool {
    ids.iter().any(|id| {
        registry::load_subject_at(home, id).is_ok_and(|s| s.is_monitoring_enabled)
    })
}

impl Reconciler {
    /// Sweep every monitoring-enabled subject under `home`.
    ///
    /// Subjects run concurrently up to `max_concurrent_subjects`; results keep
    /// registry order.
    pub async fn run_sweep(&self, home: &Path) -> Result<SweepReport, ReconcileError> {
        let ids = {
            let home = home.to_path_buf();
            tokio::task::spawn_blocking(move || {
                let ids = registry::list_subject_ids_at(&home)
                    .map_err(ReconcileError::RegistryUnavailable)?;
                if any_monitoring_enabled(&home, &ids) {
                    credentials::ensure_available_at(&home)
                        .map_err(|e| ReconcileError::CredentialStoreUnavailable(e.to_string()))?;
                }
                Ok::<_, ReconcileError>(ids)
            })
            .await
            .map_err(|e| ReconcileError::Join(e.to_string()))??
        };

        let limit = self.config().max_concurrent_subjects.max(1);
        let sweeps: Vec<_> = ids.iter().map(|id| self.sweep_subject(home, id)).collect();
        let results: Vec<SubjectSweepResult> = stream::iter(sweeps)
            .buffered(limit)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        self.locks().prune_idle().await;

        let total_auto_commits = results.iter().map(|r| r.auto_commits_successful).sum();
        tracing::info!(
            users = results.len(),
            auto_commits = total_auto_commits,
            "sweep complete"
        );
        Ok(SweepReport {
            timestamp: Utc::now(),
            users_processed: results.len(),
            total_auto_commits,
            results,
        })
    }

    /// `None` when the subject has monitoring disabled.
    async fn sweep_subject(&self, home: &Path, id: &SubjectId) -> Option<SubjectSweepResult> {
        let _guard = self.locks().acquire(id).await;
        let mut result = SubjectSweepResult::new(id);

        let mut aggregate = match load_subject(home, id).await {
            Ok(s) if !s.is_monitoring_enabled => return None,
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(subject = %id, error = %e, "subject unreadable during sweep");
                result.errors.push(format!("User error: {e}"));
                return Some(result);
            }
        };

        let credential = match load_credential(home, id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(subject = %id, error = %e, "credential unusable during sweep");
                result.errors.push("Token decryption failed".to_string());
                return Some(result);
            }
        };

        result.repos_checked = aggregate.active_repository_count();
        let repo_results = self.reconcile_subject(&mut aggregate, &credential, None).await;
        for r in &repo_results {
            if r.auto_commit_triggered {
                result.auto_commits_triggered += 1;
            }
            if r.auto_commit_success {
                result.auto_commits_successful += 1;
            }
            if let Some(err) = &r.error {
                result.errors.push(format!("{}: {err}", r.repo));
            }
        }

        if let Err(e) = save_subject(home, aggregate).await {
            tracing::error!(subject = %id, error = %e, "failed to save subject after sweep");
            result.errors.push(format!("User error: {e}"));
        }
        Some(result)
    }
}
