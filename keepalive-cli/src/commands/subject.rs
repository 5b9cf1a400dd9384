//! `keepalive subject register`, `keepalive subject revoke` and `keepalive subject list`

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use chrono::Utc;

use keepalive_core::{credentials, registry, SubjectId};
use keepalive_host::Credential;

use super::{home, Engine};

#[derive(Subcommand, Debug)]
pub enum SubjectCommand {
    /// Validate a GitHub token and register its owner as a subject.
    Register(RegisterArgs),

    /// Delete a subject's stored token and turn its background sweeps off.
    Revoke(RevokeArgs),

    /// List registered subjects.
    List,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// File holding the personal access token (surrounding whitespace is ignored).
    #[arg(long, value_name = "PATH")]
    pub token_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Subject whose token is deleted.
    pub subject: String,
}

pub fn run(cmd: SubjectCommand) -> Result<()> {
    match cmd {
        SubjectCommand::Register(args) => register(args),
        SubjectCommand::Revoke(args) => revoke(args),
        SubjectCommand::List => list(),
    }
}

fn register(args: RegisterArgs) -> Result<()> {
    let home = home()?;
    let token = fs::read_to_string(&args.token_file)
        .with_context(|| format!("failed to read token file {}", args.token_file.display()))?;
    let token = token.trim();
    anyhow::ensure!(!token.is_empty(), "token file {} is empty", args.token_file.display());

    let engine = Engine::open(&home)?;
    let subject = engine
        .block_on(
            engine
                .reconciler
                .register_subject(&home, Credential::new(token)),
        )
        .context("registration failed")?;

    println!(
        "✓ Registered '{}' ({} repositories, monitoring {})",
        subject.id,
        subject.repositories.len(),
        if subject.is_monitoring_enabled { "on" } else { "off" },
    );
    Ok(())
}

/// The subject and its repositories stay registered; `register` restores it.
fn revoke(args: RevokeArgs) -> Result<()> {
    let home = home()?;
    let id = SubjectId::parse(&args.subject)?;
    let subject = registry::load_subject_at(&home, &id)
        .with_context(|| format!("failed to load subject '{id}'"))?;

    if subject.is_monitoring_enabled {
        registry::set_monitoring_at(&home, &id, false, None, Utc::now())
            .context("failed to disable monitoring")?;
    }
    credentials::remove_credential_at(&home, &id)
        .with_context(|| format!("failed to delete the stored token for '{id}'"))?;

    println!("✓ Revoked stored token for '{id}' (monitoring off)");
    println!("Run: keepalive subject register --token-file <path> to restore it");
    Ok(())
}

fn list() -> Result<()> {
    let home = home()?;
    let subjects =
        registry::list_subjects_at(&home).context("failed to read subject registry")?;

    if subjects.is_empty() {
        println!("No subjects registered.");
        println!("Run: keepalive subject register --token-file <path>");
        return Ok(());
    }

    for subject in &subjects {
        println!(
            "{} (monitoring {}, every {}s)",
            subject.id,
            if subject.is_monitoring_enabled { "on" } else { "off" },
            subject.poll_interval_ms / 1000,
        );
        for repo in &subject.repositories {
            let paused = if repo.is_active { "" } else { " [paused]" };
            println!("  - {}{paused}", repo.full_name);
        }
    }
    Ok(())
}
