use std::path::PathBuf;

use thiserror::Error;

/// Error surface for daemon runtime, configuration, and socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("store error: {0}")]
    Store(#[from] keepalive_core::StoreError),

    #[error("host client error: {0}")]
    Host(#[from] keepalive_host::HostError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with `ok: false`.
    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// Error code from a daemon rejection, if this is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            DaemonError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
