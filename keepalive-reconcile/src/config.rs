//! Engine tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do the first time a repository is checked (no tracked sha yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstObservationPolicy {
    /// Compensate immediately if the newest visible commit is not the owner's.
    #[default]
    CompensateForeignAuthor,
    /// Seed tracked state only; never write on first sight.
    BaselineOnly,
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// How many recent commits to fetch. Only the newest is evaluated.
    pub commit_window: u8,
    /// Applied to every individual host call.
    pub call_timeout: Duration,
    pub first_observation: FirstObservationPolicy,
    /// Subjects processed at once during a sweep.
    pub max_concurrent_subjects: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            commit_window: 5,
            call_timeout: Duration::from_secs(15),
            first_observation: FirstObservationPolicy::default(),
            max_concurrent_subjects: 4,
        }
    }
}
