//! Daemon runtime: auto-sync trigger, propagation gate, drift watcher, and
//! the Unix-socket control server.
//!
//! Registry changes reach the daemon as `notify-change` socket messages from
//! mutating CLI commands; the daemon deliberately does not watch the registry
//! file itself, so its own state fold-ins never re-trigger a pass. The notify
//! watcher covers the opposite direction: client config files changing under
//! other programs' hands, surfaced as drift warnings and a detection-cache
//! invalidation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::Instant;

use nexus_core::registry;
use nexus_core::types::{SyncMode, TargetId};
use nexus_detector::{config_path_at, DetectionCache};
use nexus_sync::{drift, pipeline, status, SyncOutcome, SyncScope};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    auto_sync_log_path, logs_dir, nexus_root, socket_path, DAEMON_LABEL, DEBOUNCE_WINDOW,
};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::trigger::AutoSyncTrigger;

// ---------------------------------------------------------------------------
// Pass summaries
// ---------------------------------------------------------------------------

/// One pass's result, published on the summary channel and returned to socket
/// callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    /// `"all"` or a single target id.
    pub scope: String,
    /// `"auto"` for trigger-driven passes, `"socket"` for requested ones.
    pub source: String,
    pub successful: usize,
    pub failed: usize,
    pub manual_required: usize,
    pub total_targets: usize,
    pub duration_ms: u128,
    pub outcomes: Vec<SyncOutcome>,
    pub completed_at_unix: u64,
}

struct SyncJob {
    scope: SyncScope,
    respond_to: oneshot::Sender<Result<PassSummary, String>>,
}

/// Shared runtime state handed to every task.
#[derive(Clone)]
struct RuntimeContext {
    home: PathBuf,
    /// The propagation gate: at most one pass in flight, automatic or
    /// requested.
    gate: Arc<Mutex<()>>,
    detection: Arc<Mutex<DetectionCache>>,
    summaries: broadcast::Sender<PassSummary>,
    last_pass: Arc<RwLock<Option<PassSummary>>>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?
        .block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let ctx = RuntimeContext {
        home: home.clone(),
        gate: Arc::new(Mutex::new(())),
        detection: Arc::new(Mutex::new(DetectionCache::new(detection_ttl(&home)))),
        summaries: broadcast::channel(16).0,
        last_pass: Arc::new(RwLock::new(None)),
    };
    let started_at_unix = unix_seconds_now();

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let (trigger, trigger_handle) = {
        let ctx = ctx.clone();
        AutoSyncTrigger::spawn(DEBOUNCE_WINDOW, move || {
            let ctx = ctx.clone();
            async move {
                match execute_pass(&ctx, SyncScope::All, "auto").await {
                    Ok(pass) => tracing::info!(
                        successful = pass.successful,
                        failed = pass.failed,
                        manual = pass.manual_required,
                        duration_ms = pass.duration_ms as u64,
                        "automatic pass complete",
                    ),
                    Err(err) => tracing::error!(error = %err, "automatic pass failed"),
                }
            }
        })
    };

    let tasks = [
        (
            "drift_watcher",
            supervised(&shutdown_tx, drift_watcher_task(ctx.clone(), shutdown_tx.subscribe())),
        ),
        (
            "sync_processor",
            supervised(
                &shutdown_tx,
                sync_processor_task(ctx.clone(), sync_rx, shutdown_tx.subscribe()),
            ),
        ),
        (
            "socket_server",
            supervised(
                &shutdown_tx,
                socket_server_task(
                    ctx.clone(),
                    sync_tx.clone(),
                    trigger.clone(),
                    shutdown_tx.clone(),
                    shutdown_tx.subscribe(),
                    started_at_unix,
                ),
            ),
        ),
        (
            "log_rotation",
            supervised(&shutdown_tx, log_rotation_task(home.clone(), shutdown_tx.subscribe())),
        ),
        (
            "signal_listener",
            supervised(&shutdown_tx, signal_listener_task(shutdown_tx.subscribe())),
        ),
    ];

    let mut first_error = None;
    for (task, handle) in tasks {
        if let Err(err) = flatten_join(task, handle.await) {
            tracing::error!(task, error = %err, "daemon task ended with error");
            first_error.get_or_insert(err);
        }
    }

    // Detached client handlers may still hold trigger clones; abort instead
    // of waiting for their connections to close.
    drop(trigger);
    drop(sync_tx);
    trigger_handle.abort();
    let _ = trigger_handle.await;

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Spawn a runtime task that trips the shutdown broadcast when it exits, so
/// one task ending (or failing) brings the rest down with it.
fn supervised<F>(
    shutdown: &broadcast::Sender<()>,
    task: F,
) -> tokio::task::JoinHandle<Result<(), DaemonError>>
where
    F: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let result = task.await;
        let _ = shutdown.send(());
        result
    })
}

/// Resolves on ctrl-c; its supervisor then broadcasts shutdown. Ends quietly
/// if another task trips the broadcast first.
async fn signal_listener_task(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down daemon");
                Ok(())
            }
            Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
        },
    }
}

// ---------------------------------------------------------------------------
// Pass execution
// ---------------------------------------------------------------------------

/// Run one propagation pass under the shared gate.
///
/// Both the trigger's automatic passes and socket-requested syncs come
/// through here, so a user-initiated sync can never interleave with an
/// in-flight automatic one.
async fn execute_pass(
    ctx: &RuntimeContext,
    scope: SyncScope,
    source: &'static str,
) -> Result<PassSummary, String> {
    let _guard = ctx.gate.lock().await;
    let started = Instant::now();

    let home = ctx.home.clone();
    let result = tokio::task::spawn_blocking(move || pipeline::run_at(&home, scope, false))
        .await
        .map_err(|err| format!("sync task join error: {err}"))?;

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            if source == "auto" {
                note_auto_failure(&ctx.home, &format!("pass failed: {err}"));
            }
            return Err(err.to_string());
        }
    };

    // Client configs just changed on disk; the next status query re-detects.
    ctx.detection.lock().await.invalidate();

    let pass = PassSummary {
        scope: scope_label(scope),
        source: source.to_string(),
        successful: summary.successful,
        failed: summary.failed,
        manual_required: summary.manual_required,
        total_targets: summary.total_targets,
        duration_ms: started.elapsed().as_millis(),
        outcomes: summary.outcomes,
        completed_at_unix: unix_seconds_now(),
    };

    if source == "auto" && pass.failed > 0 {
        tracing::warn!(
            failed = pass.failed,
            total = pass.total_targets,
            "automatic pass finished with failures",
        );
        note_auto_failure(&ctx.home, &failure_line(&pass));
    }

    *ctx.last_pass.write().await = Some(pass.clone());
    let _ = ctx.summaries.send(pass.clone());
    Ok(pass)
}

fn scope_label(scope: SyncScope) -> String {
    match scope {
        SyncScope::All => "all".to_string(),
        SyncScope::Target(target) => target.to_string(),
    }
}

fn failure_line(pass: &PassSummary) -> String {
    let details: Vec<String> = pass
        .outcomes
        .iter()
        .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {e}", o.target)))
        .collect();
    format!(
        "{} of {} targets failed: {}",
        pass.failed,
        pass.total_targets,
        details.join("; ")
    )
}

/// Append one line for a failed automatic pass. Failures here are logged and
/// swallowed; the auto-sync log is advisory.
fn note_auto_failure(home: &Path, message: &str) {
    let path = auto_sync_log_path(home);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let line = format!("{} auto-sync: {message}\n", chrono::Utc::now().to_rfc3339());
    let result = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, line.as_bytes()));
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), error = %err, "could not append to auto-sync log");
    }
}

async fn sync_processor_task(
    ctx: RuntimeContext,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = execute_pass(&ctx, job.scope, "socket").await;
                let _ = job.respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    scope: SyncScope,
) -> Result<PassSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            scope,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

// ---------------------------------------------------------------------------
// Drift watcher
// ---------------------------------------------------------------------------

async fn drift_watcher_task(
    ctx: RuntimeContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched_dirs = HashSet::new();
    register_config_dirs(&mut watcher, &mut watched_dirs, &ctx.home)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        let received = tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = event_rx.recv() => received,
        };
        let event = match received {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "watcher event error");
                continue;
            }
            None => break,
        };
        if !is_relevant_event_kind(&event.kind) {
            continue;
        }

        // Config directories appear over time as clients get installed.
        register_config_dirs(&mut watcher, &mut watched_dirs, &ctx.home)?;

        for path in event.paths {
            let Some(target) = target_for_config_path(&ctx.home, &path) else {
                continue;
            };
            if should_process_event(&mut debounce, &path, Instant::now()) {
                handle_config_change(&ctx, target).await;
            }
        }
    }

    Ok(())
}

/// Watch the parent directory of every automatic target's config file.
/// FSEvents is directory-based, so registration is per-dir, non-recursive.
fn register_config_dirs(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    home: &Path,
) -> Result<(), DaemonError> {
    for target in TargetId::all() {
        if target.sync_mode() != SyncMode::Automatic {
            continue;
        }
        let Some(dir) = config_path_at(home, target).parent().map(Path::to_path_buf) else {
            continue;
        };
        let canonical = match fs::canonicalize(&dir) {
            Ok(path) => path,
            Err(_) => continue,
        };
        if watched_dirs.insert(canonical.clone()) {
            watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %canonical.display(), "watching client config directory");
        }
    }
    Ok(())
}

/// Map a watcher event path back to the automatic target whose config it is.
/// Comparison is against canonicalized parents because FSEvents reports real
/// paths.
fn target_for_config_path(home: &Path, event_path: &Path) -> Option<TargetId> {
    let file_name = event_path.file_name()?;
    let event_parent = event_path.parent().and_then(|p| fs::canonicalize(p).ok())?;

    for target in TargetId::all() {
        if target.sync_mode() != SyncMode::Automatic {
            continue;
        }
        let config = config_path_at(home, target);
        if config.file_name() != Some(file_name) {
            continue;
        }
        let matches = config
            .parent()
            .and_then(|p| fs::canonicalize(p).ok())
            .map(|canonical| canonical == event_parent)
            .unwrap_or(false);
        if matches {
            return Some(target);
        }
    }
    None
}

/// React to a client config changing on disk: invalidate cached detection and
/// surface drift if the bytes no longer match the recorded checksum. Our own
/// writes land here too; they compare clean and stay quiet.
async fn handle_config_change(ctx: &RuntimeContext, target: TargetId) {
    ctx.detection.lock().await.invalidate();

    let home = ctx.home.clone();
    let drifted = tokio::task::spawn_blocking(move || {
        let recorded = registry::load_at(&home)
            .ok()?
            .target_settings(target)
            .last_sync_checksum;
        let current = drift::current_checksum_at(&home, target);
        Some(drift::is_drifted(current.as_deref(), recorded.as_deref()))
    })
    .await
    .ok()
    .flatten()
    .unwrap_or(false);

    if drifted {
        tracing::warn!(
            target = %target,
            "config changed outside nexus; run `nexus sync` to restore it",
        );
    } else {
        tracing::debug!(target = %target, "config change matches last synced content");
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    ctx: RuntimeContext,
    sync_tx: mpsc::Sender<SyncJob>,
    trigger: AutoSyncTrigger,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&ctx.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                tokio::spawn(serve_client(
                    stream,
                    ctx.clone(),
                    sync_tx.clone(),
                    trigger.clone(),
                    shutdown_tx.clone(),
                    started_at_unix,
                ));
            }
        }
    }

    let _ = fs::remove_file(&socket);
    Ok(())
}

/// Per-connection wrapper: client errors are logged, never propagated into
/// the server task.
async fn serve_client(
    stream: UnixStream,
    ctx: RuntimeContext,
    sync_tx: mpsc::Sender<SyncJob>,
    trigger: AutoSyncTrigger,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) {
    let served =
        handle_socket_client(stream, ctx, sync_tx, trigger, shutdown_tx, started_at_unix).await;
    if let Err(err) = served {
        tracing::error!(error = %err, "socket client error");
    }
}

async fn handle_socket_client(
    stream: UnixStream,
    ctx: RuntimeContext,
    sync_tx: mpsc::Sender<SyncJob>,
    trigger: AutoSyncTrigger,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => return Err(io_err("daemon socket read", err)),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                let rejection = DaemonResponse::error(format!("invalid request JSON: {err}"));
                write_response(&mut writer, &rejection).await?;
                continue;
            }
        };

        let is_stop = matches!(request, DaemonRequest::Stop);
        let response = dispatch_request(
            request,
            &ctx,
            &sync_tx,
            &trigger,
            &shutdown_tx,
            started_at_unix,
        )
        .await;

        write_response(&mut writer, &response).await?;
        if is_stop {
            break;
        }
    }

    Ok(())
}

async fn dispatch_request(
    request: DaemonRequest,
    ctx: &RuntimeContext,
    sync_tx: &mpsc::Sender<SyncJob>,
    trigger: &AutoSyncTrigger,
    shutdown_tx: &broadcast::Sender<()>,
    started_at_unix: u64,
) -> DaemonResponse {
    match request {
        DaemonRequest::Status => match build_status_payload(ctx, trigger, started_at_unix).await {
            Ok(payload) => DaemonResponse::ok(payload),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        DaemonRequest::Sync { target } => {
            let scope = match target.as_deref().map(TargetId::from_str) {
                Some(Ok(target)) => SyncScope::Target(target),
                Some(Err(err)) => return DaemonResponse::error(err.to_string()),
                None => SyncScope::All,
            };
            match enqueue_sync(sync_tx, scope).await {
                Ok(pass) => DaemonResponse::ok(json!(pass)),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        DaemonRequest::Manual { target } => match TargetId::from_str(&target) {
            Ok(target) => match manual_payload(&ctx.home, target).await {
                Ok(payload) => {
                    DaemonResponse::ok(json!({ "target": target.to_string(), "config": payload }))
                }
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        DaemonRequest::NotifyChange => {
            let auto = auto_sync_enabled(&ctx.home).await;
            if auto {
                trigger.notify_change();
            } else {
                tracing::debug!("registry changed but auto-sync is off; not scheduling");
            }
            DaemonResponse::ok(json!({ "scheduled": auto }))
        }
        DaemonRequest::Stop => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
    }
}

async fn build_status_payload(
    ctx: &RuntimeContext,
    trigger: &AutoSyncTrigger,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let home = ctx.home.clone();
    let detection = ctx.detection.clone();
    let (loaded, detected) = tokio::task::spawn_blocking(move || {
        let loaded = registry::load_at(&home);
        let detected = detection.blocking_lock().get_or_refresh_at(&home).to_vec();
        (loaded, detected)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("status task join error: {err}")))?;

    // A daemon can outlive (or predate) the registry; show everything as
    // never-synced rather than failing the status call.
    let registry = loaded.unwrap_or_default();
    let statuses = status::merged_view_at(&ctx.home, &registry, &detected);

    let mut targets = Vec::with_capacity(statuses.len());
    for target_status in &statuses {
        let mut value = serde_json::to_value(target_status)?;
        if let Value::Object(map) = &mut value {
            map.insert("signal".to_string(), serde_json::to_value(target_status.signal())?);
        }
        targets.push(value);
    }

    let last_pass = ctx.last_pass.read().await.clone();
    Ok(json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "trigger": trigger.state(),
        "last_pass": last_pass,
        "targets": targets,
        "socket": socket_path(&ctx.home).display().to_string(),
    }))
}

async fn manual_payload(home: &Path, target: TargetId) -> Result<String, DaemonError> {
    let home = home.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let registry = registry::load_at(&home)?;
        Ok(nexus_sync::manual_config(&registry.servers_for_target(target)))
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("manual payload join error: {err}")))?
}

async fn auto_sync_enabled(home: &Path) -> bool {
    let home = home.to_path_buf();
    tokio::task::spawn_blocking(move || {
        registry::load_at(&home)
            .map(|r| r.preferences.auto_sync_on_changes)
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Housekeeping tasks and plumbing
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; consume it so startup never rotates.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            _ = interval.tick() => {}
        }
        let home = home.clone();
        // Rotation failures are logged inside rotate_logs.
        let _ = tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home)).await;
    }
}

fn detection_ttl(home: &Path) -> Duration {
    let seconds = registry::load_at(home)
        .map(|r| r.preferences.status_refresh_interval)
        .unwrap_or(60);
    Duration::from_secs(seconds)
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = nexus_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    // A leftover socket file that refuses connections belongs to a dead
    // daemon and can be reclaimed.
    if let Err(probe) = StdUnixStream::connect(socket) {
        tracing::warn!(
            socket = %socket.display(),
            error = %probe,
            "removing stale daemon socket before bind",
        );
        return match fs::remove_file(socket) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(io_err(socket, err)),
            _ => Ok(()),
        };
    }

    Err(DaemonError::Protocol(format!(
        "daemon socket already in use: {}",
        socket.display()
    )))
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
        .map_err(|e| io_err("daemon socket flush", e))
}

fn flatten_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    result.unwrap_or_else(|err| {
        Err(DaemonError::Protocol(format!(
            "{task} task did not shut down cleanly: {err}"
        )))
    })
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    let owner_only = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, owner_only).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
