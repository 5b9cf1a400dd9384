use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use keepalive_core::{registry, SubjectId};
use keepalive_host::GitHubClient;
use keepalive_reconcile::{CheckCycleReport, ReconcileError, Reconciler, SweepReport};

use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, run_dir, socket_path};
use crate::protocol::{
    DaemonRequest, DaemonResponse, CODE_BAD_REQUEST, CODE_INTERNAL, CODE_RATE_LIMITED,
};
use crate::rate_limit::{RateLimiter, TokenBucketLimiter};
use crate::trigger::{authorize_sweep, secret_fingerprint};

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Slow down polling.";
const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(5);
const LIMITER_IDLE_AGE: Duration = Duration::from_secs(600);

#[derive(Debug)]
enum JobKind {
    Check {
        subject: SubjectId,
        cancel: CancellationToken,
    },
    Sweep,
}

#[derive(Debug)]
enum JobOutcome {
    Check(CheckCycleReport),
    Sweep(SweepReport),
}

type JobResult = Result<JobOutcome, ReconcileError>;

struct ReconcileJob {
    kind: JobKind,
    source: &'static str,
    respond_to: oneshot::Sender<JobResult>,
}

/// Condensed record of the most recent sweep, surfaced by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub source: String,
    pub finished_at: DateTime<Utc>,
    pub users_processed: usize,
    pub total_auto_commits: usize,
    pub errors: usize,
    pub duration_ms: u128,
}

impl SweepSummary {
    fn from_report(report: &SweepReport, source: &str, elapsed: Duration) -> Self {
        Self {
            source: source.to_string(),
            finished_at: report.timestamp,
            users_processed: report.users_processed,
            total_auto_commits: report.total_auto_commits,
            errors: report.results.iter().map(|r| r.errors.len()).sum(),
            duration_ms: elapsed.as_millis(),
        }
    }
}

/// State shared by the socket handlers.
struct DaemonState {
    home: PathBuf,
    config: DaemonConfig,
    limiter: Arc<dyn RateLimiter>,
    last_sweep: Arc<RwLock<Option<SweepSummary>>>,
    started_at_unix: u64,
}

/// Reconciler wired to the GitHub client described by `config`.
pub fn build_reconciler(config: &DaemonConfig) -> Result<Reconciler, DaemonError> {
    let client = GitHubClient::new(config.api_base_url.as_str())?;
    Ok(Reconciler::new(Arc::new(client), config.reconcile_config()))
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    let config = DaemonConfig::load_at(home)?;
    crate::logging::init_tracing(home, config.log_format);
    let reconciler = build_reconciler(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config, reconciler))
}

/// Run the daemon until `stop`, ctrl-c, or a task failure.
pub async fn run(
    home: PathBuf,
    config: DaemonConfig,
    reconciler: Reconciler,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucketLimiter::new(
        config.rate_limit_burst as f64,
        config.rate_limit_per_sec,
    ));
    let last_sweep = Arc::new(RwLock::new(None));
    let sweep_interval = config.sweep_interval();
    let state = Arc::new(DaemonState {
        home: home.clone(),
        config,
        limiter: limiter.clone(),
        last_sweep: last_sweep.clone(),
        started_at_unix: unix_seconds_now(),
    });

    let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        home = %home.display(),
        sweep_interval_secs = sweep_interval.map(|d| d.as_secs()).unwrap_or(0),
        "keepalive daemon starting"
    );

    let timer_handle = {
        let shutdown = shutdown_tx.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = sweep_timer_task(sweep_interval, job_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result =
                job_processor_task(home, reconciler, last_sweep, job_rx, shutdown.subscribe())
                    .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(state, job_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(job_tx);

    let housekeeping_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = housekeeping_task(home, limiter, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (timer_result, processor_result, socket_result, housekeeping_result, signal_result) = tokio::join!(
        timer_handle,
        processor_handle,
        socket_handle,
        housekeeping_handle,
        signal_handle
    );

    handle_join("sweep_timer", timer_result)?;
    handle_join("job_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("housekeeping", housekeeping_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("keepalive daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn sweep_timer_task(
    period: Option<Duration>,
    job_tx: mpsc::Sender<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(period) = period else {
        tracing::info!("internal sweep timer disabled");
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match enqueue(&job_tx, JobKind::Sweep, "timer").await {
                    Ok(Ok(JobOutcome::Sweep(report))) => tracing::info!(
                        users = report.users_processed,
                        auto_commits = report.total_auto_commits,
                        "timer sweep completed",
                    ),
                    Ok(Ok(JobOutcome::Check(_))) => {}
                    Ok(Err(err)) => tracing::error!(error = %err, "timer sweep failed"),
                    Err(err) => {
                        // The processor closes the queue on shutdown.
                        tracing::debug!(error = %err, "sweep timer stopping");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Spawns each job so a slow subject never blocks the queue; per-subject
/// ordering is enforced by the reconciler's locks. On shutdown, in-flight
/// checks are cancelled and awaited.
async fn job_processor_task(
    home: PathBuf,
    reconciler: Reconciler,
    last_sweep: Arc<RwLock<Option<SweepSummary>>>,
    mut job_rx: mpsc::Receiver<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let tracker = TaskTracker::new();
    let shutdown_token = CancellationToken::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let reconciler = reconciler.clone();
                let home = home.clone();
                let last_sweep = last_sweep.clone();
                let shutdown_token = shutdown_token.clone();
                tracker.spawn(async move {
                    let outcome = execute_job(&reconciler, &home, job.kind, job.source, &last_sweep, &shutdown_token).await;
                    let _ = job.respond_to.send(outcome);
                });
            }
        }
    }

    shutdown_token.cancel();
    tracker.close();
    tracker.wait().await;
    Ok(())
}

async fn execute_job(
    reconciler: &Reconciler,
    home: &Path,
    kind: JobKind,
    source: &'static str,
    last_sweep: &RwLock<Option<SweepSummary>>,
    shutdown: &CancellationToken,
) -> JobResult {
    let started = Instant::now();
    match kind {
        JobKind::Check { subject, cancel } => {
            // Either the client going away or daemon shutdown stops the walk.
            let watcher = {
                let cancel = cancel.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => cancel.cancel(),
                        _ = cancel.cancelled() => {}
                    }
                })
            };
            let result = reconciler.run_check_cycle(home, &subject, &cancel).await;
            watcher.abort();
            tracing::info!(
                subject = %subject,
                source,
                ok = result.is_ok(),
                duration_ms = started.elapsed().as_millis() as u64,
                "check job finished",
            );
            result.map(JobOutcome::Check)
        }
        JobKind::Sweep => {
            let report = reconciler.run_sweep(home).await?;
            let summary = SweepSummary::from_report(&report, source, started.elapsed());
            *last_sweep.write().await = Some(summary);
            Ok(JobOutcome::Sweep(report))
        }
    }
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, job_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn housekeeping_task(
    home: PathBuf,
    limiter: Arc<dyn RateLimiter>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(HOUSEKEEPING_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // Rotation failures are logged inside rotate_logs.
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home))
                    .await
                    .ok();
                limiter.cleanup(LIMITER_IDLE_AGE).await;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Socket requests
// ---------------------------------------------------------------------------

type ClientLines = Lines<BufReader<OwnedReadHalf>>;

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    // A line read while a check was running, handled on the next turn.
    let mut carried: Option<String> = None;

    loop {
        let line = match carried.take() {
            Some(line) => line,
            None => match lines
                .next_line()
                .await
                .map_err(|e| io_err("daemon socket read", e))?
            {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(CODE_BAD_REQUEST, format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state).await),
            "check" => {
                match handle_check(&state, &job_tx, request.subject, &mut lines, &mut carried).await
                {
                    Some(response) => response,
                    None => return Ok(()),
                }
            }
            "sweep" => handle_sweep(&state, &job_tx, request.secret.as_deref()).await,
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(CODE_BAD_REQUEST, format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

/// `None` when the client disconnected; the cycle has been cancelled.
async fn handle_check(
    state: &DaemonState,
    job_tx: &mpsc::Sender<ReconcileJob>,
    subject: Option<String>,
    lines: &mut ClientLines,
    carried: &mut Option<String>,
) -> Option<DaemonResponse> {
    let Some(raw) = subject.filter(|s| !s.trim().is_empty()) else {
        return Some(DaemonResponse::from_reconcile_error(
            &ReconcileError::Unauthenticated,
        ));
    };
    let subject = match SubjectId::parse(&raw) {
        Ok(id) => id,
        Err(err) => return Some(DaemonResponse::error(CODE_BAD_REQUEST, err.to_string())),
    };

    if !state.limiter.allow(&format!("poll_{subject}")).await {
        tracing::warn!(subject = %subject, "check rate limited");
        return Some(DaemonResponse::error(CODE_RATE_LIMITED, RATE_LIMITED_MESSAGE));
    }

    let cancel = CancellationToken::new();
    let kind = JobKind::Check {
        subject: subject.clone(),
        cancel: cancel.clone(),
    };
    let mut rx = match submit(job_tx, kind, "socket").await {
        Ok(rx) => rx,
        Err(err) => return Some(internal_error(&err)),
    };

    let outcome = loop {
        tokio::select! {
            received = &mut rx => break received_outcome(received),
            next = lines.next_line(), if carried.is_none() => match next {
                Ok(Some(line)) => *carried = Some(line),
                Ok(None) | Err(_) => {
                    tracing::info!(subject = %subject, "client disconnected, cancelling check");
                    cancel.cancel();
                    return None;
                }
            },
        }
    };

    Some(match outcome {
        Ok(Ok(JobOutcome::Check(report))) => DaemonResponse::ok(json!(report)),
        Ok(Ok(JobOutcome::Sweep(_))) => {
            DaemonResponse::from_reconcile_error(&ReconcileError::Join("unexpected job outcome".into()))
        }
        Ok(Err(err)) => DaemonResponse::from_reconcile_error(&err),
        Err(err) => internal_error(&err),
    })
}

async fn handle_sweep(
    state: &DaemonState,
    job_tx: &mpsc::Sender<ReconcileJob>,
    secret: Option<&str>,
) -> DaemonResponse {
    if let Err(err) = authorize_sweep(state.config.sweep_secret.as_deref(), secret) {
        tracing::warn!(error = %err, "sweep request refused");
        return DaemonResponse::from_reconcile_error(&err);
    }
    match enqueue(job_tx, JobKind::Sweep, "socket").await {
        Ok(Ok(JobOutcome::Sweep(report))) => DaemonResponse::ok(json!(report)),
        Ok(Ok(JobOutcome::Check(_))) => {
            DaemonResponse::from_reconcile_error(&ReconcileError::Join("unexpected job outcome".into()))
        }
        Ok(Err(err)) => DaemonResponse::from_reconcile_error(&err),
        Err(err) => internal_error(&err),
    }
}

async fn build_status_payload(state: &DaemonState) -> Value {
    let home = state.home.clone();
    let listed = tokio::task::spawn_blocking(move || registry::list_subjects_at(&home)).await;

    let (subjects, registry_error) = match listed {
        Ok(Ok(subjects)) => (
            subjects
                .iter()
                .map(|s| {
                    json!({
                        "id": s.id.to_string(),
                        "monitoring_enabled": s.is_monitoring_enabled,
                        "repositories": s.repositories.len(),
                        "active_repositories": s.active_repository_count(),
                        "auto_commits": s.total_auto_commits(),
                    })
                })
                .collect::<Vec<_>>(),
            None,
        ),
        Ok(Err(err)) => (Vec::new(), Some(err.to_string())),
        Err(err) => (Vec::new(), Some(format!("registry scan join error: {err}"))),
    };

    let last_sweep = state.last_sweep.read().await.clone();

    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "sweep_interval_secs": state.config.sweep_interval_secs,
        "sweep_secret": state.config.sweep_secret.as_deref().map(secret_fingerprint),
        "last_sweep": last_sweep,
        "subjects": subjects,
        "registry_error": registry_error,
        "socket": socket_path(&state.home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

async fn submit(
    job_tx: &mpsc::Sender<ReconcileJob>,
    kind: JobKind,
    source: &'static str,
) -> Result<oneshot::Receiver<JobResult>, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(ReconcileJob {
            kind,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile queue"))?;
    Ok(rx)
}

async fn enqueue(
    job_tx: &mpsc::Sender<ReconcileJob>,
    kind: JobKind,
    source: &'static str,
) -> Result<JobResult, DaemonError> {
    let rx = submit(job_tx, kind, source).await?;
    received_outcome(rx.await)
}

/// The outer error means the job was dropped without an answer.
fn received_outcome(
    received: Result<JobResult, oneshot::error::RecvError>,
) -> Result<JobResult, DaemonError> {
    received.map_err(|_| DaemonError::ChannelClosed("reconcile response"))
}

fn internal_error(err: &DaemonError) -> DaemonResponse {
    tracing::error!(error = %err, "reconcile queue unavailable");
    DaemonResponse::error(CODE_INTERNAL, err.to_string())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(home: &Path, config: DaemonConfig) -> DaemonState {
        DaemonState {
            home: home.to_path_buf(),
            limiter: Arc::new(TokenBucketLimiter::new(1.0, 0.0)),
            config,
            last_sweep: Arc::new(RwLock::new(None)),
            started_at_unix: 1_000_000,
        }
    }

    #[tokio::test]
    async fn status_payload_before_any_sweep() {
        let home = TempDir::new().expect("home");
        let payload = build_status_payload(&state(home.path(), DaemonConfig::default())).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_sweep"], Value::Null);
        assert_eq!(payload["sweep_secret"], Value::Null);
        assert!(payload["subjects"].as_array().expect("subjects").is_empty());
    }

    #[tokio::test]
    async fn status_payload_lists_subjects_and_last_sweep() {
        let home = TempDir::new().expect("home");
        let id = SubjectId::from("alice");
        registry::register_subject_at(home.path(), &id, "alice", Utc::now()).expect("register");
        let config = DaemonConfig {
            sweep_secret: Some("s3cret".into()),
            ..DaemonConfig::default()
        };
        let state = state(home.path(), config);
        *state.last_sweep.write().await = Some(SweepSummary {
            source: "timer".into(),
            finished_at: Utc::now(),
            users_processed: 1,
            total_auto_commits: 2,
            errors: 0,
            duration_ms: 12,
        });

        let payload = build_status_payload(&state).await;
        let subjects = payload["subjects"].as_array().expect("subjects");
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0]["id"], json!("alice"));
        assert_eq!(subjects[0]["monitoring_enabled"], json!(false));
        assert_eq!(payload["last_sweep"]["total_auto_commits"], json!(2));
        assert_eq!(payload["sweep_secret"], json!(secret_fingerprint("s3cret")));
    }

    #[tokio::test]
    async fn sweep_without_configured_secret_is_refused_before_queueing() {
        let home = TempDir::new().expect("home");
        let (job_tx, mut job_rx) = mpsc::channel(1);
        let response =
            handle_sweep(&state(home.path(), DaemonConfig::default()), &job_tx, Some("x")).await;

        assert!(!response.ok);
        assert_eq!(response.code.as_deref(), Some("configuration"));
        assert!(job_rx.try_recv().is_err(), "nothing may be queued");
    }

    #[tokio::test]
    async fn closed_queue_reports_channel_closed() {
        let (job_tx, job_rx) = mpsc::channel(1);
        drop(job_rx);
        let err = enqueue(&job_tx, JobKind::Sweep, "test").await.unwrap_err();
        assert!(matches!(err, DaemonError::ChannelClosed("reconcile queue")), "got: {err}");
    }

    #[tokio::test]
    async fn dropped_job_reports_channel_closed() {
        let (job_tx, mut job_rx) = mpsc::channel(1);
        let rx = submit(&job_tx, JobKind::Sweep, "test").await.expect("queued");
        drop(job_rx.recv().await.expect("job"));
        let err = received_outcome(rx.await).unwrap_err();
        assert!(matches!(err, DaemonError::ChannelClosed("reconcile response")));
    }

    #[tokio::test]
    async fn sweep_on_closed_queue_answers_internal() {
        let home = TempDir::new().expect("home");
        let config = DaemonConfig {
            sweep_secret: Some("s3cret".into()),
            ..DaemonConfig::default()
        };
        let (job_tx, job_rx) = mpsc::channel(1);
        drop(job_rx);
        let response = handle_sweep(&state(home.path(), config), &job_tx, Some("s3cret")).await;

        assert!(!response.ok);
        assert_eq!(response.code.as_deref(), Some(CODE_INTERNAL));
        assert_eq!(
            response.error.as_deref(),
            Some("channel closed: reconcile queue")
        );
    }

    #[test]
    fn stale_socket_file_is_removed() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("keepalive.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }
}
