//! # keepalive-reconcile
//!
//! The reconciliation engine: decide whether a repository's newest commit is
//! new and foreign ([`detector`]), write the keep-alive change
//! ([`executor`]), and drive both over one subject or every monitoring-enabled
//! subject ([`Reconciler`]).

pub mod config;
pub mod cycle;
pub mod detector;
pub mod error;
pub mod executor;
pub mod locks;
pub mod manage;
pub mod sweep;

pub use config::{FirstObservationPolicy, ReconcileConfig};
pub use cycle::{CheckCycleReport, Reconciler, RepoCheckResult};
pub use detector::{detect, Detection};
pub use error::ReconcileError;
pub use executor::{apply_keepalive_marker, perform_keepalive, ExecutionOutcome};
pub use sweep::{SubjectSweepResult, SweepReport};
