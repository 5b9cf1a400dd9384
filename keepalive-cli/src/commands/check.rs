//! `keepalive check <subject>`: one on-demand check cycle.
//!
//! Goes through the daemon when its socket answers, otherwise runs the cycle
//! in this process. Call-level failures other than "not found" are written to
//! the subject's activity log as `Poll Error`.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use keepalive_core::{registry, ActivityAction, ActivityLogEntry, SubjectId};
use keepalive_daemon::protocol::CODE_NOT_FOUND;
use keepalive_daemon::{request_check, DaemonError};
use keepalive_reconcile::{CheckCycleReport, RepoCheckResult};

use super::{home, print_json, Engine};

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub subject: String,

    /// Emit the raw cycle report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Run in this process even if the daemon is up.
    #[arg(long)]
    pub local: bool,
}

struct CheckFailure {
    not_found: bool,
    error: anyhow::Error,
}

impl CheckFailure {
    fn new(not_found: bool, error: impl Into<anyhow::Error>, context: &'static str) -> Self {
        Self {
            not_found,
            error: error.into().context(context),
        }
    }
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let subject = SubjectId::parse(&self.subject)
            .map_err(|e| anyhow::Error::new(e).context(format!("invalid subject '{}'", self.subject)))?;

        let report = match self.check(&home, &subject) {
            Ok(report) => report,
            Err(failure) => {
                if !failure.not_found {
                    record_poll_error(&home, &subject, &failure.error);
                }
                return Err(failure.error);
            }
        };

        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }

    fn check(&self, home: &Path, subject: &SubjectId) -> Result<CheckCycleReport, CheckFailure> {
        if !self.local {
            match request_check(home, Some(&subject.0)) {
                Ok(value) => {
                    return serde_json::from_value(value).map_err(|e| {
                        CheckFailure::new(false, e, "daemon returned a malformed check report")
                    })
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {}
                Err(err) => {
                    let not_found = err.code() == Some(CODE_NOT_FOUND);
                    return Err(CheckFailure::new(not_found, err, "daemon check failed"));
                }
            }
        }

        let engine = Engine::open(home).map_err(|error| CheckFailure {
            not_found: false,
            error,
        })?;
        engine
            .block_on(
                engine
                    .reconciler
                    .run_check_cycle(home, subject, &CancellationToken::new()),
            )
            .map_err(|err| CheckFailure::new(err.is_not_found(), err, "check failed"))
    }
}

fn record_poll_error(home: &Path, subject: &SubjectId, error: &anyhow::Error) {
    let entry = ActivityLogEntry::system(
        ActivityAction::PollError,
        format!("Check failed: {error:#}"),
        false,
        Utc::now(),
    );
    if let Err(err) = registry::record_activity_at(home, subject, entry) {
        eprintln!("warning: could not record poll error for '{subject}': {err}");
    }
}

fn print_report(report: &CheckCycleReport) {
    if report.results.is_empty() {
        println!("No active repositories for '{}'.", report.subject);
        return;
    }

    for result in &report.results {
        println!("{} {:<32} {}", marker(result), result.repo, result.message);
    }

    let triggered = report
        .results
        .iter()
        .filter(|r| r.auto_commit_triggered)
        .count();
    let succeeded = report
        .results
        .iter()
        .filter(|r| r.auto_commit_success)
        .count();
    println!(
        "{} repositories checked, {succeeded}/{triggered} keep-alive commits written",
        report.results.iter().filter(|r| r.checked).count(),
    );
    if report.cancelled {
        println!("{}", "check was cancelled before every repository was visited".yellow());
    }
}

fn marker(result: &RepoCheckResult) -> String {
    if result.error.is_some() || (result.auto_commit_triggered && !result.auto_commit_success) {
        "✗".red().to_string()
    } else if result.auto_commit_success {
        "✓".green().to_string()
    } else {
        "·".bright_black().to_string()
    }
}
