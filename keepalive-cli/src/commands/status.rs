//! `keepalive status`: subjects, repositories and keep-alive counts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use keepalive_core::{registry, MonitoringSubject};
use keepalive_daemon::{send_request, DaemonRequest};

use super::{format_age, home, print_json};

/// Arguments for `keepalive status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    subjects: Vec<SubjectStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    subjects: usize,
    repositories: usize,
    monitoring: usize,
    auto_commits: u64,
    daemon_running: bool,
}

#[derive(Serialize)]
struct SubjectStatusJson {
    id: String,
    monitoring_enabled: bool,
    poll_interval_ms: u64,
    repositories: Vec<RepoStatusJson>,
}

#[derive(Serialize)]
struct RepoStatusJson {
    full_name: String,
    active: bool,
    last_commit_sha: Option<String>,
    last_commit_author: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_check_age: String,
    auto_commit_count: u64,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "last author")]
    author: String,
    #[tabled(rename = "last check")]
    last_check: String,
    #[tabled(rename = "keep-alives")]
    auto_commits: u64,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let subjects =
            registry::list_subjects_at(&home).context("failed to read subject registry")?;
        let daemon_running = send_request(&home, &DaemonRequest::new("status"))
            .map(|response| response.ok)
            .unwrap_or(false);

        if self.json {
            return print_json(&build_json(&subjects, daemon_running));
        }
        print_table(&subjects, daemon_running);
        Ok(())
    }
}

fn build_json(subjects: &[MonitoringSubject], daemon_running: bool) -> StatusReportJson {
    StatusReportJson {
        summary: StatusSummaryJson {
            subjects: subjects.len(),
            repositories: subjects.iter().map(|s| s.repositories.len()).sum(),
            monitoring: subjects.iter().filter(|s| s.is_monitoring_enabled).count(),
            auto_commits: subjects.iter().map(|s| s.total_auto_commits()).sum(),
            daemon_running,
        },
        subjects: subjects
            .iter()
            .map(|s| SubjectStatusJson {
                id: s.id.to_string(),
                monitoring_enabled: s.is_monitoring_enabled,
                poll_interval_ms: s.poll_interval_ms,
                repositories: s
                    .repositories
                    .iter()
                    .map(|r| RepoStatusJson {
                        full_name: r.full_name.clone(),
                        active: r.is_active,
                        last_commit_sha: r.last_commit_sha.clone(),
                        last_commit_author: r.last_commit_author.clone(),
                        last_checked_at: r.last_checked_at,
                        last_check_age: format_age(r.last_checked_at),
                        auto_commit_count: r.auto_commit_count,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn print_table(subjects: &[MonitoringSubject], daemon_running: bool) {
    let repositories: usize = subjects.iter().map(|s| s.repositories.len()).sum();
    let auto_commits: u64 = subjects.iter().map(|s| s.total_auto_commits()).sum();
    println!(
        "keepalive v{} | {} subjects | {} repositories | {} keep-alive commits | daemon {}",
        env!("CARGO_PKG_VERSION"),
        subjects.len(),
        repositories,
        auto_commits,
        if daemon_running {
            "running".green().to_string()
        } else {
            "stopped".bright_black().to_string()
        },
    );

    if subjects.is_empty() {
        println!("No subjects registered.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    for subject in subjects {
        let monitoring = if subject.is_monitoring_enabled {
            "monitoring on".green()
        } else {
            "monitoring off".yellow()
        };
        println!("{} ({monitoring})", subject.id.to_string().to_uppercase().bold());
        if subject.repositories.is_empty() {
            println!("  no repositories");
        } else {
            let rows: Vec<StatusTableRow> = subject
                .repositories
                .iter()
                .map(|r| StatusTableRow {
                    repository: r.full_name.clone(),
                    state: if r.is_active { "active" } else { "paused" }.to_string(),
                    author: r
                        .last_commit_author
                        .clone()
                        .unwrap_or_else(|| "-".to_string()),
                    last_check: format_age(r.last_checked_at),
                    auto_commits: r.auto_commit_count,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        println!("{separator}");
    }

    if subjects.iter().any(|s| !s.is_monitoring_enabled) {
        println!("Run 'keepalive monitoring enable --subject <name>' to include a subject in sweeps.");
    }
}
