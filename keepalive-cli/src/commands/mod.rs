//! Subcommand implementations plus the plumbing they share.

pub mod activity;
pub mod check;
pub mod daemon;
pub mod monitoring;
pub mod repo;
pub mod status;
pub mod subject;
pub mod sweep;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use keepalive_core::{registry, SubjectId};
use keepalive_daemon::{build_reconciler, DaemonConfig};
use keepalive_reconcile::Reconciler;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Reconciler plus a runtime, for commands that talk to the host in-process.
pub(crate) struct Engine {
    pub config: DaemonConfig,
    pub reconciler: Reconciler,
    runtime: tokio::runtime::Runtime,
}

impl Engine {
    pub fn open(home: &Path) -> Result<Self> {
        init_tracing();
        let config = DaemonConfig::load_at(home).context("failed to load keepalive config")?;
        let reconciler = build_reconciler(&config).context("failed to build host client")?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        Ok(Self {
            config,
            reconciler,
            runtime,
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The named subject, or the only registered one when none is named.
pub(crate) fn resolve_subject(home: &Path, subject: Option<&str>) -> Result<SubjectId> {
    if let Some(raw) = subject {
        return SubjectId::parse(raw).with_context(|| format!("invalid subject '{raw}'"));
    }
    let ids = registry::list_subject_ids_at(home).context("failed to read subject registry")?;
    match ids.len() {
        0 => Err(anyhow!(
            "No subjects registered. Run `keepalive subject register --token-file <path>` first."
        )),
        1 => ids.into_iter().next().context("subject list is empty"),
        _ => {
            let names: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
            Err(anyhow!(
                "Multiple subjects found ({}). Specify --subject <name>.",
                names.join(", ")
            ))
        }
    }
}

pub(crate) fn format_age(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0) as u64;
    let short = if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 60 * 60 {
        format!("{}m", seconds / 60)
    } else if seconds < 60 * 60 * 24 {
        format!("{}h", seconds / (60 * 60))
    } else {
        format!("{}d", seconds / (60 * 60 * 24))
    };
    format!("{short} ago")
}

pub(crate) fn short_sha(sha: Option<&str>) -> String {
    match sha {
        Some(sha) => sha.chars().take(7).collect(),
        None => "-".to_string(),
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
