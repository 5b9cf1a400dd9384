//! `keepalive repo add|remove|pause|resume|list`

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use keepalive_core::{registry, RepoSlug};

use super::{format_age, home, resolve_subject, short_sha, Engine};

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Start watching a repository (checks that the token can see it).
    Add(RepoArgs),

    /// Stop watching a repository.
    Remove(RepoArgs),

    /// Keep a repository registered but skip it during checks.
    Pause(RepoArgs),

    /// Resume checks for a paused repository.
    Resume(RepoArgs),

    /// List a subject's repositories with their tracked state.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct RepoArgs {
    /// Repository as `owner/name`.
    pub repo: String,

    /// Subject to act for. Optional when only one subject is registered.
    #[arg(long, short = 's')]
    pub subject: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, short = 's')]
    pub subject: Option<String>,
}

#[derive(Tabled)]
struct RepoRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "active")]
    active: &'static str,
    #[tabled(rename = "last commit")]
    last_commit: String,
    #[tabled(rename = "author")]
    author: String,
    #[tabled(rename = "checked")]
    checked: String,
    #[tabled(rename = "keep-alives")]
    auto_commits: u64,
}

pub fn run(cmd: RepoCommand) -> Result<()> {
    match cmd {
        RepoCommand::Add(args) => add(args),
        RepoCommand::Remove(args) => remove(args),
        RepoCommand::Pause(args) => set_active(args, false),
        RepoCommand::Resume(args) => set_active(args, true),
        RepoCommand::List(args) => list(args),
    }
}

fn parse_slug(raw: &str) -> Result<RepoSlug> {
    raw.parse::<RepoSlug>()
        .with_context(|| format!("'{raw}' is not a valid owner/name repository"))
}

fn add(args: RepoArgs) -> Result<()> {
    let home = home()?;
    let subject = resolve_subject(&home, args.subject.as_deref())?;
    let slug = parse_slug(&args.repo)?;

    let engine = Engine::open(&home)?;
    let repo = engine
        .block_on(engine.reconciler.add_repository(&home, &subject, &slug))
        .with_context(|| format!("failed to add '{slug}' for '{subject}'"))?;

    match repo.last_commit_sha.as_deref() {
        Some(sha) => println!(
            "✓ Watching '{}' (latest {} by {})",
            repo.full_name,
            short_sha(Some(sha)),
            repo.last_commit_author.as_deref().unwrap_or("unknown"),
        ),
        None => println!("✓ Watching '{}' (no commits yet)", repo.full_name),
    }
    Ok(())
}

fn remove(args: RepoArgs) -> Result<()> {
    let home = home()?;
    let subject = resolve_subject(&home, args.subject.as_deref())?;
    let slug = parse_slug(&args.repo)?;

    registry::remove_repository_at(&home, &subject, &slug, Utc::now())
        .with_context(|| format!("failed to remove '{slug}' for '{subject}'"))?;
    println!("✓ Stopped watching '{slug}'");
    Ok(())
}

fn set_active(args: RepoArgs, active: bool) -> Result<()> {
    let home = home()?;
    let subject = resolve_subject(&home, args.subject.as_deref())?;
    let slug = parse_slug(&args.repo)?;

    registry::set_repository_active_at(&home, &subject, &slug, active, Utc::now())
        .with_context(|| format!("failed to update '{slug}' for '{subject}'"))?;
    println!(
        "✓ {} '{slug}'",
        if active { "Resumed" } else { "Paused" }
    );
    Ok(())
}

fn list(args: ListArgs) -> Result<()> {
    let home = home()?;
    let subject = resolve_subject(&home, args.subject.as_deref())?;
    let aggregate = registry::load_subject_at(&home, &subject)
        .with_context(|| format!("failed to load subject '{subject}'"))?;

    if aggregate.repositories.is_empty() {
        println!("'{subject}' is not watching any repositories.");
        println!("Run: keepalive repo add <owner/name> --subject {subject}");
        return Ok(());
    }

    let rows: Vec<RepoRow> = aggregate
        .repositories
        .iter()
        .map(|repo| RepoRow {
            repository: repo.full_name.clone(),
            active: if repo.is_active { "yes" } else { "paused" },
            last_commit: short_sha(repo.last_commit_sha.as_deref()),
            author: repo
                .last_commit_author
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            checked: format_age(repo.last_checked_at),
            auto_commits: repo.auto_commit_count,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
