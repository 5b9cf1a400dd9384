//! Source Host Client boundary.
//!
//! The reconciliation engine only ever talks to a [`SourceHost`]. This crate
//! defines that trait, the data crossing it, and [`GitHubClient`], the REST
//! implementation used in production.

pub mod error;
pub mod github;
pub mod types;

use async_trait::async_trait;

pub use error::HostError;
pub use github::{GitHubClient, DEFAULT_API_BASE_URL};
pub use keepalive_core::{Credential, RepoSlug};
pub use types::{CommitInfo, FileWrite, HostIdentity, RepoInfo, TrackedFile};

/// Authenticated operations the engine needs from a repository host.
///
/// Absence is data, not an error: an empty repository yields an empty commit
/// list, a missing README yields `Ok(None)`, a rejected credential yields
/// `Ok(None)` from [`SourceHost::validate_credential`].
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Newest-first commits on the default branch, at most `limit`.
    async fn list_recent_commits(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        limit: u8,
    ) -> Result<Vec<CommitInfo>, HostError>;

    /// The tracked file (the repository README) with its revision marker.
    async fn read_tracked_file(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<TrackedFile>, HostError>;

    /// Replace the tracked file. `write.revision` is the concurrency token;
    /// a stale one fails with [`HostError::Conflict`].
    async fn write_tracked_file(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        write: &FileWrite,
    ) -> Result<(), HostError>;

    /// The identity owning `credential`, or `None` if the host rejects it.
    async fn validate_credential(
        &self,
        credential: &Credential,
    ) -> Result<Option<HostIdentity>, HostError>;

    /// Existence and access check for one repository.
    async fn repository_info(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<RepoInfo>, HostError>;
}
