//! Error types for keepalive-reconcile.
//!
//! Per-repository and per-subject failures never appear here: they are folded
//! into result entries. These are the call-level failures.

use thiserror::Error;

use keepalive_core::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No subject identity accompanied the request.
    #[error("unauthenticated: no subject given")]
    Unauthenticated,

    #[error("subject '{0}' not found")]
    SubjectNotFound(String),

    /// The subject's credential is missing, malformed, or rejected by the host.
    #[error("credential for '{subject}' is invalid: {reason}")]
    CredentialInvalid { subject: String, reason: String },

    #[error("credential store unavailable: {0}")]
    CredentialStoreUnavailable(String),

    #[error("subject registry unavailable: {0}")]
    RegistryUnavailable(#[source] StoreError),

    /// The repository does not exist or the credential cannot see it.
    #[error("repository '{0}' not found or not accessible")]
    RepositoryInaccessible(String),

    /// Host failure outside a check cycle (registration, repository add).
    #[error("source host error: {0}")]
    Host(#[from] keepalive_host::HostError),

    /// Required configuration missing, e.g. the sweep secret.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(String),
}

impl ReconcileError {
    /// Terminal "no such thing" outcomes the caller should not log as a poll error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReconcileError::SubjectNotFound(_)
                | ReconcileError::Store(StoreError::SubjectNotFound { .. })
                | ReconcileError::Store(StoreError::RepositoryNotFound { .. })
        )
    }
}
