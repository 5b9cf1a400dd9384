//! keepalive core library: subject aggregate types, tracked commit state,
//! the capped activity log, and file-backed persistence.
//!
//! - [`types`]: newtypes and the [`MonitoringSubject`] aggregate
//! - [`tracker`]: compare-and-update of per-repository commit state
//! - [`activity`]: most-recent-first activity log capped at 50 entries
//! - [`registry`]: load / save / mutate subjects under `~/.keepalive/`
//! - [`credentials`]: per-subject host credential files
//! - [`error`]: [`StoreError`], [`CredentialError`]

pub mod activity;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod tracker;
pub mod types;

pub use activity::{ActivityAction, ActivityLog, ActivityLogEntry, SYSTEM_REPO};
pub use error::{CredentialError, StoreError};
pub use tracker::TrackedCommit;
pub use types::{Credential, MonitoredRepository, MonitoringSubject, RepoSlug, SubjectId};
