//! Error types for keepalive-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from subject registry operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse subject at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; `~/.keepalive/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No aggregate file exists for the subject.
    #[error("subject '{subject}' not found at {path}")]
    SubjectNotFound { subject: String, path: PathBuf },

    /// The subject does not monitor the named repository.
    #[error("repository '{repo}' is not monitored by '{subject}'")]
    RepositoryNotFound { subject: String, repo: String },

    /// The subject already monitors the named repository.
    #[error("repository '{repo}' is already monitored by '{subject}'")]
    DuplicateRepository { subject: String, repo: String },

    /// An `owner/name` pair or subject handle failed format validation.
    #[error("invalid repository '{0}': expected owner/name using [A-Za-z0-9_.-]")]
    InvalidRepository(String),

    #[error("invalid subject handle '{0}'")]
    InvalidSubject(String),
}

/// Errors from the per-subject credential files.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The credential directory itself is missing or unreadable. Fatal for a sweep.
    #[error("credential store unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// No credential file for this subject.
    #[error("no credential stored for '{subject}'")]
    Missing { subject: String },

    /// The credential file exists but does not hold a usable token.
    #[error("credential for '{subject}' is malformed")]
    Malformed { subject: String },

    #[error("credential I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
