//! Polling reload worker with atomic swap-or-rollback.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::instance::ConfigInstance;
use super::loader::build_snapshot;
use crate::error::{ReloadFailure, WatcherReloadError};
use crate::schema::ConfigSchema;
use crate::source::{ChangeMarker, SourceSet};

/// Receives reload failures. Failures never reach readers of the current instance.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: WatcherReloadError);
}

/// Logs reload failures at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: WatcherReloadError) {
        error!(at = %error.at, error = %error.cause, "Configuration reload failed");
    }
}

impl ErrorSink for mpsc::UnboundedSender<WatcherReloadError> {
    fn report(&self, error: WatcherReloadError) {
        if let Err(e) = self.send(error) {
            warn!(error = %e.0, "Reload error receiver dropped");
        }
    }
}

/// Adapts a closure into an [`ErrorSink`].
pub struct FnSink<F>(pub F);

impl<F> ErrorSink for FnSink<F>
where
    F: Fn(WatcherReloadError) + Send + Sync,
{
    fn report(&self, error: WatcherReloadError) {
        (self.0)(error)
    }
}

/// Invoked with each newly published instance.
pub type Callback = Arc<dyn Fn(&Arc<ConfigInstance>) -> anyhow::Result<()> + Send + Sync>;

/// Settings for the background worker.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Time between change checks.
    pub interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// What one check cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No source changed since the last build, or the change already failed once.
    Unchanged,
    /// A new instance was published.
    Reloaded,
    /// The attempt was discarded and reported; the previous instance is still current.
    Rejected,
}

/// Source state a failed attempt was made against.
#[derive(Debug, Clone, PartialEq)]
enum Observed {
    Markers(Vec<Option<ChangeMarker>>),
    Unreadable(String),
}

struct ReloadState {
    baseline: Vec<Option<ChangeMarker>>,
    last_failed: Option<Observed>,
}

/// Registered callbacks and the number of ticks currently running them.
#[derive(Default)]
struct Listeners {
    callbacks: Vec<Callback>,
    in_flight: usize,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between a live configuration, its handles and its worker.
pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) current: ArcSwap<ConfigInstance>,
    schema: Arc<ConfigSchema>,
    sources: SourceSet,
    sink: Arc<dyn ErrorSink>,
    state: Mutex<ReloadState>,
    listeners: Mutex<Listeners>,
    idle: Notify,
    worker: Mutex<Option<Worker>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(
        schema: Arc<ConfigSchema>,
        sources: SourceSet,
        sink: Arc<dyn ErrorSink>,
        instance: Arc<ConfigInstance>,
        baseline: Vec<Option<ChangeMarker>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            current: ArcSwap::new(instance),
            schema,
            sources,
            sink,
            state: Mutex::new(ReloadState {
                baseline,
                last_failed: None,
            }),
            listeners: Mutex::new(Listeners::default()),
            idle: Notify::new(),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Runs one check cycle. Change detection and the swap are serialized by the state
    /// lock; callbacks run after it is released, so they may call back into the watcher.
    pub(crate) fn tick(&self) -> TickOutcome {
        match self.check_and_swap() {
            Ok(instance) => {
                self.dispatch(&instance);
                TickOutcome::Reloaded
            }
            Err(outcome) => outcome,
        }
    }

    /// Publishes a fresh instance if the sources changed, or says why nothing was published.
    fn check_and_swap(&self) -> Result<Arc<ConfigInstance>, TickOutcome> {
        let mut state = lock(&self.state);

        let markers = match self.sources.markers() {
            Ok(markers) => markers,
            Err(e) => {
                let observed = Observed::Unreadable(e.to_string());
                if state.last_failed.as_ref() == Some(&observed) {
                    return Err(TickOutcome::Unchanged);
                }
                state.last_failed = Some(observed);
                self.sink.report(WatcherReloadError::now(e));
                return Err(TickOutcome::Rejected);
            }
        };

        if markers == state.baseline {
            state.last_failed = None;
            return Err(TickOutcome::Unchanged);
        }

        let observed = Observed::Markers(markers);
        if state.last_failed.as_ref() == Some(&observed) {
            return Err(TickOutcome::Unchanged);
        }

        info!(watcher = %self.id, "Source change detected, rebuilding configuration");

        match build_snapshot(&self.schema, &self.sources) {
            Ok((instance, loaded)) => {
                self.current.store(Arc::clone(&instance));
                state.baseline = loaded;
                state.last_failed = None;
                info!(watcher = %self.id, "Configuration reloaded");
                Ok(instance)
            }
            Err(e) => {
                warn!(
                    watcher = %self.id,
                    error = %e,
                    "Reload rejected, keeping current configuration"
                );
                state.last_failed = Some(observed);
                self.sink.report(WatcherReloadError::now(e));
                Err(TickOutcome::Rejected)
            }
        }
    }

    /// Runs every registered callback with `instance`, isolating failures.
    fn dispatch(&self, instance: &Arc<ConfigInstance>) {
        let callbacks = {
            let mut listeners = lock(&self.listeners);
            if listeners.callbacks.is_empty() {
                return;
            }
            listeners.in_flight += 1;
            listeners.callbacks.clone()
        };

        for callback in &callbacks {
            if let Err(message) = invoke(callback, instance) {
                self.sink
                    .report(WatcherReloadError::now(ReloadFailure::Callback { message }));
            }
        }

        let mut listeners = lock(&self.listeners);
        listeners.in_flight -= 1;
        if listeners.in_flight == 0 {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn add_callback(&self, callback: Callback) {
        lock(&self.listeners).callbacks.push(callback);
    }

    pub(crate) fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Starts the worker unless one is already running.
    pub(crate) fn ensure_worker(self: &Arc<Self>, options: &WatchOptions) {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker(
            Arc::downgrade(self),
            options.interval,
            shutdown_rx,
        ));
        info!(
            watcher = %self.id,
            interval_ms = options.interval.as_millis() as u64,
            "Reload watcher started"
        );
        *worker = Some(Worker { shutdown, handle });
    }

    /// Halts the worker and waits for it, and for any callbacks already running, to finish.
    /// Safe to call repeatedly.
    pub(crate) async fn stop(&self) {
        let worker = lock(&self.worker).take();
        lock(&self.listeners).callbacks.clear();

        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                warn!(watcher = %self.id, error = %e, "Reload worker exited abnormally");
            }
            info!(watcher = %self.id, "Reload watcher stopped");
        }

        // Ticks driven from other threads may still be running callbacks they took earlier.
        loop {
            let idle = self.idle.notified();
            if lock(&self.listeners).in_flight == 0 {
                break;
            }
            idle.await;
        }
    }
}

async fn run_worker(shared: Weak<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                let outcome = shared.tick();
                debug!(watcher = %shared.id, ?outcome, "Reload check complete");
            }
        }
    }
}

/// Runs a callback, turning both errors and panics into a message.
fn invoke(callback: &Callback, instance: &Arc<ConfigInstance>) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| callback(instance))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("callback panicked: {}", s)
    } else {
        "callback panicked".to_string()
    }
}

/// Returned by `watch`; stops the shared worker.
#[derive(Clone)]
pub struct WatchHandle {
    pub(crate) shared: Arc<Shared>,
}

impl WatchHandle {
    /// Stops the worker. When this returns, no callback is running or will run.
    pub async fn stop(&self) {
        self.shared.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Identifier used in this watcher's log events.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .finish()
    }
}
