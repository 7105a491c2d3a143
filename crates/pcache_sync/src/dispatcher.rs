//! Single-flight dispatch of sync runs.
//!
//! In background mode the engine runs on a worker obtained from a
//! [`WorkerHost`]. The caller and the worker talk only through two
//! unbounded channels of encoded [`WorkerMessage`] frames:
//!
//! ```text
//! caller ──control (start, stop)──▶ worker ── SyncEngine::run
//!   ▲                                  │
//!   └── relay ◀──events (progress, complete, error)
//! ```
//!
//! The relay thread decodes events, updates the [`SyncTracker`] and then
//! invokes the caller's [`SyncCallbacks`]. Without a host, or if the host
//! cannot start a worker, the run happens in the caller's thread.

use crate::cancel::{CancelCheck, CancellationToken};
use crate::config::{DispatcherConfig, SyncRunConfig};
use crate::engine::{SyncEngine, SyncProgress};
use crate::protocol::WorkerMessage;
use crate::state::{SyncState, SyncStatus, SyncTracker};
use parking_lot::Mutex;
use pcache_core::{CacheError, CacheResult};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// A provider of dedicated background execution.
pub trait WorkerHost: Send + Sync {
    /// Starts `job` on a new worker.
    fn spawn_worker(&self, name: &str, job: Box<dyn FnOnce() + Send>)
        -> io::Result<JoinHandle<()>>;
}

/// Runs workers on named OS threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadHost;

impl WorkerHost for ThreadHost {
    fn spawn_worker(
        &self,
        name: &str,
        job: Box<dyn FnOnce() + Send>,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(job)
    }
}

/// Where a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On a background worker; `start` returns immediately.
    Background,
    /// In the caller's thread; `start` returns when the run is over.
    InProcess,
}

/// Caller-supplied reactions to run events.
///
/// In background mode they are invoked on the relay thread, after the
/// tracker has been updated.
#[derive(Default)]
pub struct SyncCallbacks {
    on_progress: Option<Box<dyn FnMut(SyncProgress) + Send>>,
    on_complete: Option<Box<dyn FnOnce(i64) + Send>>,
    on_error: Option<Box<dyn FnOnce(CacheError) + Send>>,
}

impl SyncCallbacks {
    /// Creates callbacks that ignore every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after every committed page and once more at the end.
    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(SyncProgress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Called with the completion epoch when the run succeeds.
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce(i64) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called when the run fails or is aborted.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(CacheError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn progress(&mut self, progress: SyncProgress) {
        if let Some(f) = self.on_progress.as_mut() {
            f(progress);
        }
    }

    fn complete(self, completed_at: i64) {
        if let Some(f) = self.on_complete {
            f(completed_at);
        }
    }

    fn error(self, error: CacheError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

impl std::fmt::Debug for SyncCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// The handle of the current (or most recent) run.
struct ActiveRun {
    mode: ExecutionMode,
    cancel: CancellationToken,
    control: Option<UnboundedSender<Vec<u8>>>,
    threads: Vec<JoinHandle<()>>,
}

impl ActiveRun {
    fn request_stop(&self) {
        self.cancel.cancel();
        if let Some(control) = &self.control {
            match WorkerMessage::Stop.encode() {
                Ok(frame) => {
                    if control.send(frame).is_err() {
                        debug!("worker already gone");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode stop message"),
            }
        }
    }
}

/// Runs sync runs one at a time.
///
/// `start` while a run is active fails with [`CacheError::Busy`]; it never
/// queues. Dropping the dispatcher stops the active run and joins its
/// threads.
pub struct SyncDispatcher {
    engine: Arc<SyncEngine>,
    tracker: Arc<SyncTracker>,
    config: DispatcherConfig,
    host: Option<Arc<dyn WorkerHost>>,
    active: Mutex<Option<ActiveRun>>,
}

impl SyncDispatcher {
    /// Creates a dispatcher. With `host` set to `None` every run is in-process.
    pub fn new(
        engine: Arc<SyncEngine>,
        tracker: Arc<SyncTracker>,
        config: DispatcherConfig,
        host: Option<Arc<dyn WorkerHost>>,
    ) -> Self {
        Self {
            engine,
            tracker,
            config,
            host,
            active: Mutex::new(None),
        }
    }

    /// Returns the shared state tracker.
    pub fn tracker(&self) -> &Arc<SyncTracker> {
        &self.tracker
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.tracker.state()
    }

    /// Gets a snapshot of the sync status.
    pub fn status(&self) -> SyncStatus {
        self.tracker.status()
    }

    /// Returns true while a run is active.
    pub fn is_running(&self) -> bool {
        self.tracker.state().is_active()
    }

    /// Returns how the current or most recent run executes.
    pub fn mode(&self) -> Option<ExecutionMode> {
        self.active.lock().as_ref().map(|run| run.mode)
    }

    /// Starts a full resync.
    ///
    /// Run outcomes are delivered through `callbacks`; the returned result
    /// only says whether and where the run started.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Busy`] if a run is already active
    /// - [`CacheError::Configuration`] for a zero page size
    pub fn start(&self, callbacks: SyncCallbacks) -> CacheResult<ExecutionMode> {
        let run_config = SyncRunConfig::new(self.engine.store().workspace_id())
            .with_page_size(self.config.page_size);
        run_config.validate()?;

        let (mode, previous, inline) = {
            let mut active = self.active.lock();
            self.tracker.begin()?;

            let mut inline = None;
            let spawned = match self.host.as_ref().filter(|_| self.config.background) {
                Some(host) => self.spawn_background(&**host, &run_config, callbacks),
                None => Err(callbacks),
            };
            let run = spawned.unwrap_or_else(|callbacks| {
                let cancel = CancellationToken::new();
                inline = Some((cancel.clone(), callbacks));
                ActiveRun {
                    mode: ExecutionMode::InProcess,
                    cancel,
                    control: None,
                    threads: Vec::new(),
                }
            });

            let mode = run.mode;
            (mode, active.replace(run), inline)
        };

        if let Some(previous) = previous {
            join_all(previous.threads);
        }

        info!(
            workspace = %run_config.workspace_id,
            page_size = run_config.page_size,
            mode = ?mode,
            "sync started"
        );

        if let Some((cancel, callbacks)) = inline {
            self.run_in_process(&run_config, &cancel, callbacks);
        }
        Ok(mode)
    }

    /// Requests cancellation of the active run.
    ///
    /// The run stops before its next page fetch. Returns false if no run
    /// was active.
    pub fn stop(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(run) if self.tracker.state().is_active() => {
                info!(workspace = %self.engine.store().workspace_id(), "sync stop requested");
                run.request_stop();
                true
            }
            _ => false,
        }
    }

    /// Stops the active run, if any, and waits for its threads.
    ///
    /// A background worker exits at its next page boundary.
    pub fn shutdown(&self) {
        let run = self.active.lock().take();
        if let Some(mut run) = run {
            if self.tracker.state().is_active() {
                run.request_stop();
            }
            run.control = None;
            join_all(std::mem::take(&mut run.threads));
        }
    }

    /// Starts the worker and its relay, handing `callbacks` back if either
    /// could not be started.
    fn spawn_background(
        &self,
        host: &dyn WorkerHost,
        run_config: &SyncRunConfig,
        callbacks: SyncCallbacks,
    ) -> Result<ActiveRun, SyncCallbacks> {
        let (control_tx, control_rx) = unbounded_channel::<Vec<u8>>();
        let (events_tx, events_rx) = unbounded_channel::<Vec<u8>>();

        let engine = Arc::clone(&self.engine);
        let worker = match host.spawn_worker(
            "pcache-sync-worker",
            Box::new(move || worker_main(&engine, control_rx, events_tx)),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not start sync worker, running in-process");
                return Err(callbacks);
            }
        };

        let cancel = CancellationToken::new();
        let slot = Arc::new(Mutex::new(Some(callbacks)));
        let relay = {
            let tracker = Arc::clone(&self.tracker);
            let slot = Arc::clone(&slot);
            thread::Builder::new()
                .name("pcache-sync-relay".to_string())
                .spawn(move || {
                    if let Some(callbacks) = slot.lock().take() {
                        relay_main(events_rx, &tracker, callbacks);
                    }
                })
        };

        let relay = match relay {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not start sync relay, running in-process");
                drop(control_tx);
                join_all(vec![worker]);
                return Err(slot.lock().take().unwrap_or_default());
            }
        };

        let start = WorkerMessage::Start {
            config: run_config.clone(),
        };
        match start.encode() {
            Ok(frame) => {
                if control_tx.send(frame).is_err() {
                    warn!("sync worker exited before start");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode start message"),
        }

        Ok(ActiveRun {
            mode: ExecutionMode::Background,
            cancel,
            control: Some(control_tx),
            threads: vec![worker, relay],
        })
    }

    fn run_in_process(
        &self,
        run_config: &SyncRunConfig,
        cancel: &CancellationToken,
        mut callbacks: SyncCallbacks,
    ) {
        let tracker = &self.tracker;
        let result = self
            .engine
            .run(cancel, run_config.page_size, &mut |progress| {
                tracker.record_progress(progress.progress);
                callbacks.progress(progress);
            });

        match result {
            Ok(report) => {
                tracker.complete(report.completed_at);
                callbacks.complete(report.completed_at);
            }
            Err(e) => {
                warn!(error = %e, "sync failed");
                tracker.fail(&e);
                callbacks.error(e);
            }
        }
    }
}

impl Drop for SyncDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDispatcher")
            .field("config", &self.config)
            .field("has_host", &self.host.is_some())
            .field("state", &self.tracker.state())
            .finish()
    }
}

/// Joins `threads`, skipping the calling thread.
fn join_all(threads: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for handle in threads {
        if handle.thread().id() == current {
            continue;
        }
        if handle.join().is_err() {
            warn!("sync thread panicked");
        }
    }
}

/// Control messages as seen from inside the worker.
///
/// Latches once `stop` arrives or the caller side goes away.
struct ControlInbox {
    rx: Mutex<UnboundedReceiver<Vec<u8>>>,
    stopped: AtomicBool,
}

impl CancelCheck for ControlInbox {
    fn is_cancelled(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return true;
        }

        let mut rx = self.rx.lock();
        loop {
            match rx.try_recv() {
                Ok(frame) => match WorkerMessage::decode(&frame) {
                    Ok(WorkerMessage::Stop) => break,
                    Ok(other) => debug!(message = other.name(), "ignoring control message"),
                    Err(e) => warn!(error = %e, "dropping control frame"),
                },
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        true
    }
}

fn worker_main(
    engine: &SyncEngine,
    mut control: UnboundedReceiver<Vec<u8>>,
    events: UnboundedSender<Vec<u8>>,
) {
    let emit = |message: WorkerMessage| match message.encode() {
        Ok(frame) => {
            if events.send(frame).is_err() {
                debug!("relay gone, dropping {}", message.name());
            }
        }
        Err(e) => warn!(error = %e, "failed to encode worker event"),
    };

    let config = match control.blocking_recv().map(|frame| WorkerMessage::decode(&frame)) {
        None => {
            debug!("sync worker released before start");
            return;
        }
        Some(Ok(WorkerMessage::Start { config })) => config,
        Some(Ok(other)) => {
            emit(WorkerMessage::Error {
                message: format!("expected start message, got {}", other.name()),
                aborted: false,
            });
            return;
        }
        Some(Err(e)) => {
            emit(WorkerMessage::Error {
                message: e.to_string(),
                aborted: false,
            });
            return;
        }
    };

    if config.workspace_id != engine.store().workspace_id() {
        emit(WorkerMessage::Error {
            message: format!(
                "worker bound to workspace {} cannot sync {}",
                engine.store().workspace_id(),
                config.workspace_id
            ),
            aborted: false,
        });
        return;
    }

    let inbox = ControlInbox {
        rx: Mutex::new(control),
        stopped: AtomicBool::new(false),
    };
    let result = engine.run(&inbox, config.page_size, &mut |progress| {
        emit(WorkerMessage::from(progress))
    });

    match result {
        Ok(report) => emit(WorkerMessage::Complete {
            last_sync: report.completed_at,
        }),
        Err(e) => emit(WorkerMessage::Error {
            aborted: matches!(e, CacheError::Aborted { .. }),
            message: e.to_string(),
        }),
    }
}

fn relay_main(
    mut events: UnboundedReceiver<Vec<u8>>,
    tracker: &SyncTracker,
    mut callbacks: SyncCallbacks,
) {
    let mut synced = 0u64;

    while let Some(frame) = events.blocking_recv() {
        let message = match WorkerMessage::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping worker frame");
                continue;
            }
        };

        match message {
            WorkerMessage::Progress {
                progress,
                total,
                is_complete,
            } => {
                synced = progress;
                tracker.record_progress(progress);
                callbacks.progress(SyncProgress {
                    progress,
                    total,
                    is_complete,
                });
            }
            WorkerMessage::Complete { last_sync } => {
                tracker.complete(last_sync);
                callbacks.complete(last_sync);
                return;
            }
            WorkerMessage::Error { message, aborted } => {
                let error = if aborted {
                    CacheError::Aborted { synced }
                } else {
                    warn!(%message, "background sync failed");
                    CacheError::SyncFailed { message }
                };
                tracker.fail(&error);
                callbacks.error(error);
                return;
            }
            other => warn!(message = other.name(), "unexpected message from worker"),
        }
    }

    let error = CacheError::SyncFailed {
        message: "sync worker exited without a result".into(),
    };
    tracker.fail(&error);
    callbacks.error(error);
}
