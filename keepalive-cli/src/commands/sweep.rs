//! `keepalive sweep`: check every monitoring-enabled subject.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use keepalive_daemon::config::ENV_SWEEP_SECRET;
use keepalive_daemon::trigger::authorize_sweep;
use keepalive_daemon::{request_sweep, DaemonError};
use keepalive_reconcile::SweepReport;

use super::{home, print_json, Engine};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Shared sweep secret. Falls back to KEEPALIVE_SWEEP_SECRET.
    #[arg(long)]
    pub secret: Option<String>,

    #[arg(long)]
    pub json: bool,

    /// Run in this process even if the daemon is up.
    #[arg(long)]
    pub local: bool,
}

impl SweepArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let secret = self
            .secret
            .clone()
            .or_else(|| std::env::var(ENV_SWEEP_SECRET).ok());

        let daemon_report = if self.local {
            None
        } else {
            match request_sweep(&home, secret.as_deref()) {
                Ok(value) => Some(
                    serde_json::from_value::<SweepReport>(value)
                        .context("daemon returned a malformed sweep report")?,
                ),
                Err(DaemonError::DaemonNotRunning { .. }) => None,
                Err(err) => return Err(err).context("daemon sweep failed"),
            }
        };

        let report = match daemon_report {
            Some(report) => report,
            None => {
                let engine = Engine::open(&home)?;
                authorize_sweep(engine.config.sweep_secret.as_deref(), secret.as_deref())
                    .context("sweep refused")?;
                engine
                    .block_on(engine.reconciler.run_sweep(&home))
                    .context("sweep failed")?
            }
        };

        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &SweepReport) {
    println!(
        "Swept {} subjects, {} keep-alive commits written",
        report.users_processed, report.total_auto_commits
    );
    for result in &report.results {
        let mark = if result.errors.is_empty() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{mark} {}: {} repositories, {}/{} keep-alive commits",
            result.subject,
            result.repos_checked,
            result.auto_commits_successful,
            result.auto_commits_triggered,
        );
        for error in &result.errors {
            println!("    {}", error.red());
        }
    }
}
