//! `keepalive monitoring enable|disable`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use keepalive_core::types::{MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};

use super::{home, resolve_subject, Engine};

#[derive(Subcommand, Debug)]
pub enum MonitoringCommand {
    /// Include the subject in periodic sweeps.
    Enable(ToggleArgs),

    /// Exclude the subject from periodic sweeps.
    Disable(ToggleArgs),
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    #[arg(long, short = 's')]
    pub subject: Option<String>,

    /// Preferred poll interval in milliseconds (10000-300000; other values are ignored).
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

pub fn run(cmd: MonitoringCommand) -> Result<()> {
    let (enabled, args) = match cmd {
        MonitoringCommand::Enable(args) => (true, args),
        MonitoringCommand::Disable(args) => (false, args),
    };

    let home = home()?;
    let subject = resolve_subject(&home, args.subject.as_deref())?;
    if let Some(ms) = args.interval_ms {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&ms) {
            eprintln!("warning: interval {ms}ms is outside {MIN_POLL_INTERVAL_MS}-{MAX_POLL_INTERVAL_MS}ms and was ignored");
        }
    }

    let engine = Engine::open(&home)?;
    let updated = engine
        .block_on(
            engine
                .reconciler
                .set_monitoring(&home, &subject, enabled, args.interval_ms),
        )
        .with_context(|| {
            format!(
                "failed to {} monitoring for '{subject}'",
                if enabled { "enable" } else { "disable" }
            )
        })?;

    println!(
        "✓ Monitoring {} for '{}' (every {}s)",
        if updated.is_monitoring_enabled { "enabled" } else { "disabled" },
        updated.id,
        updated.poll_interval_ms / 1000,
    );
    Ok(())
}
