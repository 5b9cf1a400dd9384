//! `keepalive activity <subject>`: show or clear the activity log.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use keepalive_core::{registry, ActivityLogEntry, SubjectId};

use super::{format_age, home, print_json};

#[derive(Args, Debug)]
pub struct ActivityArgs {
    pub subject: String,

    /// Empty the log instead of printing it.
    #[arg(long)]
    pub clear: bool,

    /// Emit machine-readable JSON (newest first).
    #[arg(long, conflicts_with = "clear")]
    pub json: bool,
}

#[derive(Tabled)]
struct ActivityRow {
    #[tabled(rename = "when")]
    when: String,
    #[tabled(rename = "repository")]
    repo: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "")]
    outcome: String,
    #[tabled(rename = "message")]
    message: String,
}

impl ActivityArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let subject = SubjectId::parse(&self.subject)
            .with_context(|| format!("invalid subject '{}'", self.subject))?;

        if self.clear {
            registry::clear_activity_at(&home, &subject, Utc::now())
                .with_context(|| format!("failed to clear activity for '{subject}'"))?;
            println!("✓ Cleared activity log for '{subject}'");
            return Ok(());
        }

        let aggregate = registry::load_subject_at(&home, &subject)
            .with_context(|| format!("failed to load subject '{subject}'"))?;
        let entries: Vec<&ActivityLogEntry> = aggregate.activity_log.iter().collect();

        if self.json {
            return print_json(&entries);
        }
        if entries.is_empty() {
            println!("No activity recorded for '{subject}'.");
            return Ok(());
        }

        let rows: Vec<ActivityRow> = entries
            .into_iter()
            .map(|entry| ActivityRow {
                when: format_age(Some(entry.timestamp)),
                repo: entry.repo.clone(),
                action: entry.action.label().to_string(),
                outcome: if entry.success {
                    "✓".green().to_string()
                } else {
                    "✗".red().to_string()
                },
                message: entry.message.clone(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
