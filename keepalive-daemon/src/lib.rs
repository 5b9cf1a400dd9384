//! keepalive daemon: periodic sweep timer + reconcile job processor + socket server.

mod error;
pub mod config;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod protocol;
pub mod rate_limit;
mod runtime;
pub mod trigger;

pub use config::{DaemonConfig, LogFormat};
pub use error::DaemonError;
pub use protocol::{
    request_check, request_status, request_stop, request_sweep, send_request, DaemonRequest,
    DaemonResponse,
};
pub use rate_limit::{RateLimiter, TokenBucketLimiter};
pub use runtime::{build_reconciler, run, start_blocking, SweepSummary, RATE_LIMITED_MESSAGE};
