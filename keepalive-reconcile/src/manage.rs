//! Subject and repository management that needs the source host.
//!
//! Each operation takes the subject lock so it cannot interleave with a
//! check cycle in the same process.

use std::path::Path;

use chrono::Utc;

use keepalive_core::{
    credentials, registry, ActivityAction, ActivityLogEntry, MonitoredRepository,
    MonitoringSubject, RepoSlug, SubjectId,
};
use keepalive_host::Credential;

use crate::cycle::{load_credential, load_subject, with_store, Reconciler};
use crate::error::ReconcileError;
use crate::executor::timed;

impl Reconciler {
    /// Validate `credential` with the host and create (or refresh) the subject
    /// named after the identity it belongs to.
    pub async fn register_subject(
        &self,
        home: &Path,
        credential: Credential,
    ) -> Result<MonitoringSubject, ReconcileError> {
        let identity = timed(
            self.config().call_timeout,
            self.host().validate_credential(&credential),
        )
        .await?
        .ok_or_else(|| ReconcileError::CredentialInvalid {
            subject: "<unknown>".to_string(),
            reason: "rejected by host".to_string(),
        })?;

        let id = SubjectId::parse(&identity.login)?;
        let _guard = self.locks().acquire(&id).await;
        let home = home.to_path_buf();
        let login = identity.login.clone();
        let subject = tokio::task::spawn_blocking(move || {
            credentials::store_credential_at(&home, &id, &credential).map_err(|e| {
                ReconcileError::CredentialStoreUnavailable(e.to_string())
            })?;
            registry::register_subject_at(&home, &id, &login, Utc::now())
                .map_err(ReconcileError::Store)
        })
        .await
        .map_err(|e| ReconcileError::Join(e.to_string()))??;

        tracing::info!(subject = %subject.id, "subject registered");
        Ok(subject)
    }

    /// Validate access to `slug`, seed tracked state from its newest commit,
    /// and add it to the subject's list.
    pub async fn add_repository(
        &self,
        home: &Path,
        subject: &SubjectId,
        slug: &RepoSlug,
    ) -> Result<MonitoredRepository, ReconcileError> {
        let _guard = self.locks().acquire(subject).await;

        let aggregate = load_subject(home, subject).await?;
        if aggregate.repository(slug).is_some() {
            return Err(ReconcileError::Store(
                keepalive_core::StoreError::DuplicateRepository {
                    subject: subject.0.clone(),
                    repo: slug.to_string(),
                },
            ));
        }
        let credential = load_credential(home, subject).await?;
        let call_timeout = self.config().call_timeout;

        let info = timed(call_timeout, self.host().repository_info(&credential, slug))
            .await?
            .ok_or_else(|| ReconcileError::RepositoryInaccessible(slug.to_string()))?;

        let mut repo = MonitoredRepository::new(slug, info.full_name);
        let now = Utc::now();
        match timed(call_timeout, self.host().list_recent_commits(&credential, slug, 1)).await {
            Ok(commits) => match commits.first() {
                Some(newest) => repo.commit(&newest.sha, &newest.author, now),
                None => repo.touch(now),
            },
            Err(e) => {
                tracing::warn!(repo = %slug, error = %e, "could not seed tracked state; first check will");
            }
        }

        let (home, id) = (home.to_path_buf(), subject.clone());
        let added = with_store(move || registry::add_repository_at(&home, &id, repo, now)).await?;
        tracing::info!(subject = %subject, repo = %slug, "repository added");
        Ok(added)
    }

    /// Turn sweep participation on or off.
    ///
    /// Enabling requires a usable stored credential; without one the toggle is
    /// refused and `Monitoring Toggle Failed` is logged.
    pub async fn set_monitoring(
        &self,
        home: &Path,
        subject: &SubjectId,
        enabled: bool,
        poll_interval_ms: Option<u64>,
    ) -> Result<MonitoringSubject, ReconcileError> {
        let _guard = self.locks().acquire(subject).await;
        load_subject(home, subject).await?;

        if enabled {
            if let Err(e) = load_credential(home, subject).await {
                let entry = ActivityLogEntry::system(
                    ActivityAction::MonitoringToggleFailed,
                    format!("Could not enable monitoring: {e}"),
                    false,
                    Utc::now(),
                );
                let (h, id) = (home.to_path_buf(), subject.clone());
                with_store(move || registry::record_activity_at(&h, &id, entry)).await?;
                return Err(e);
            }
        }

        let (home, id) = (home.to_path_buf(), subject.clone());
        with_store(move || {
            registry::set_monitoring_at(&home, &id, enabled, poll_interval_ms, Utc::now())
        })
        .await
    }
}
