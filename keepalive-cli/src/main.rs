//! keepalive: keep a GitHub owner's contribution trail alive when
//! collaborators push to their repositories.
//!
//! # Usage
//!
//! ```text
//! keepalive subject register --token-file <path>
//! keepalive subject list
//! keepalive repo add|remove|pause|resume <owner/name> [--subject <s>]
//! keepalive repo list [--subject <s>]
//! keepalive monitoring enable|disable [--subject <s>] [--interval-ms N]
//! keepalive activity <subject> [--clear] [--json]
//! keepalive check <subject> [--json]
//! keepalive sweep [--secret <s>] [--json]
//! keepalive status [--json]
//! keepalive daemon start|stop|status|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    activity::ActivityArgs, check::CheckArgs, daemon::DaemonCommand,
    monitoring::MonitoringCommand, repo::RepoCommand, status::StatusArgs, subject::SubjectCommand,
    sweep::SweepArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "keepalive",
    version,
    about = "Answer collaborator commits with keep-alive README commits",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register or list monitoring subjects.
    Subject {
        #[command(subcommand)]
        command: SubjectCommand,
    },

    /// Manage the repositories a subject watches.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Turn background sweeps on or off for a subject.
    Monitoring {
        #[command(subcommand)]
        command: MonitoringCommand,
    },

    /// Show or clear a subject's activity log.
    Activity(ActivityArgs),

    /// Run one check cycle for a subject now.
    Check(CheckArgs),

    /// Sweep every monitoring-enabled subject.
    Sweep(SweepArgs),

    /// Show subjects, repositories and keep-alive counts.
    Status(StatusArgs),

    /// Manage the keepalive background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Subject { command } => commands::subject::run(command),
        Commands::Repo { command } => commands::repo::run(command),
        Commands::Monitoring { command } => commands::monitoring::run(command),
        Commands::Activity(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Sweep(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
