//! Instance scheduling: one-shot fan-out and the daemon loop.
//!
//! The scheduler owns the set of connector instances built from the config
//! backend. Each instance runs concurrently on its own cadence; a slow or
//! hung upstream for one source never delays another. Configuration is
//! re-listed periodically in daemon mode and diffed by document hash, so
//! operators add, remove, and edit documents without restarts. Shutdown
//! stops dispatch, flips the cancellation signal observed at batch
//! boundaries, and waits out a grace period before abandoning stragglers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::backends::{BackendError, ConfigBackend};
use crate::config::{ConnectorConfig, InstanceId, document_hash};
use crate::connectors::{Connector, ConnectorRegistry};
use crate::events::{Event, EventEmitter};
use crate::runtime::pipeline::{Pipeline, RunError, RunOutcome};

/// Seconds shaved off an instance's frequency to form its run deadline.
const DEADLINE_MARGIN_SECONDS: i64 = 5;
/// Smallest run deadline handed out in daemon mode.
const MIN_DEADLINE_SECONDS: i64 = 10;

/// Errors that prevent the scheduler from running at all.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("no instances loaded from configuration")]
    #[diagnostic(
        code(grove::scheduler::no_instances),
        help("Every document failed validation or the config backend listed nothing.")
    )]
    NoInstances,

    #[error("config backend failure: {0}")]
    #[diagnostic(code(grove::scheduler::backend))]
    Backend(#[from] BackendError),
}

/// Tunables resolved from the environment by the entrypoints.
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// Seconds between config re-lists in daemon mode.
    pub refresh_interval: Duration,
    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace: Duration,
    /// Upper bound on concurrently running workers; `None` leaves the cache
    /// lock as the only limit.
    pub max_parallelism: Option<usize>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
            max_parallelism: None,
        }
    }
}

impl SchedulerOptions {
    pub const REFRESH_VAR: &'static str = "GROVE_CONFIG_REFRESH";
    pub const GRACE_VAR: &'static str = "GROVE_SHUTDOWN_GRACE";
    pub const PARALLELISM_VAR: &'static str = "GROVE_MAX_PARALLELISM";

    /// Read options from `GROVE_CONFIG_REFRESH`, `GROVE_SHUTDOWN_GRACE`, and
    /// `GROVE_MAX_PARALLELISM`. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let seconds = |var: &str| {
            std::env::var(var)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
        };
        Self {
            refresh_interval: seconds(Self::REFRESH_VAR)
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            shutdown_grace: seconds(Self::GRACE_VAR)
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
            max_parallelism: seconds(Self::PARALLELISM_VAR).map(|n| n.max(1) as usize),
        }
    }
}

/// Outcome tally for a batch of runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub records: u64,
}

impl SchedulerReport {
    fn absorb(&mut self, instance: &InstanceId, result: Result<Result<RunOutcome, RunError>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(outcome)) if outcome.skipped => self.skipped += 1,
            Ok(Ok(outcome)) => {
                self.succeeded += 1;
                self.records += outcome.records;
            }
            Ok(Err(err)) if err.is_failure() => {
                warn!(instance = %instance, error = %err, "run failed");
                self.failed += 1;
            }
            Ok(Err(_)) => self.cancelled += 1,
            Err(join_err) => {
                warn!(instance = %instance, error = %join_err, "worker panicked");
                self.failed += 1;
            }
        }
    }

    /// Process exit code per the CLI contract: 1 when any run fatally
    /// failed, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 { 1 } else { 0 }
    }
}

/// Programmatic equivalent of SIGTERM for an embedded daemon.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    /// Ask the daemon loop to shut down gracefully.
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

struct InstanceState {
    config: Arc<ConnectorConfig>,
    connector: Arc<dyn Connector>,
    document_hash: String,
    last_run: Option<Instant>,
    worker: Option<JoinHandle<Result<RunOutcome, RunError>>>,
}

impl InstanceState {
    fn frequency(&self) -> u64 {
        self.config
            .frequency
            .unwrap_or_else(|| self.connector.default_frequency())
    }

    fn due(&self) -> bool {
        self.worker.is_none()
            && self
                .last_run
                .is_none_or(|at| at.elapsed() >= Duration::from_secs(self.frequency()))
    }
}

struct LoadedDocument {
    config: ConnectorConfig,
    connector: Arc<dyn Connector>,
    hash: String,
}

/// Runs connector instances on their cadences against one [`Pipeline`].
pub struct Scheduler {
    configs: Arc<dyn ConfigBackend>,
    connectors: ConnectorRegistry,
    pipeline: Arc<Pipeline>,
    emitter: EventEmitter,
    options: SchedulerOptions,
    instances: FxHashMap<InstanceId, InstanceState>,
    /// Workers for removed or replaced instances, allowed to finish.
    draining: Vec<(InstanceId, JoinHandle<Result<RunOutcome, RunError>>)>,
    limiter: Option<Arc<Semaphore>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        configs: Arc<dyn ConfigBackend>,
        connectors: ConnectorRegistry,
        pipeline: Arc<Pipeline>,
        emitter: EventEmitter,
        options: SchedulerOptions,
    ) -> Self {
        let limiter = options
            .max_parallelism
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            configs,
            connectors,
            pipeline,
            emitter,
            options,
            instances: FxHashMap::default(),
            draining: Vec::new(),
            limiter,
            cancel_tx,
            cancel_rx,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// A handle that stops a running daemon loop, for embedders that manage
    /// their own lifecycle instead of process signals.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_tx))
    }

    /// List, parse, and validate every configuration document.
    ///
    /// Per-document failures are reported and skipped so one bad document
    /// never takes down the rest of the fleet.
    async fn load_documents(&self) -> Result<FxHashMap<InstanceId, LoadedDocument>, SchedulerError> {
        let mut loaded: FxHashMap<InstanceId, LoadedDocument> = FxHashMap::default();
        let ids = self.configs.list().await?;
        for id in ids {
            let bytes = match self.configs.get(&id).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.diagnostic("config", format!("skipping `{id}`: {err}"));
                    continue;
                }
            };
            let config = match ConnectorConfig::parse(&bytes) {
                Ok(config) => config,
                Err(err) => {
                    self.diagnostic("config", format!("skipping `{id}`: {err}"));
                    continue;
                }
            };
            if config.disabled {
                continue;
            }
            let Some(connector) = self.connectors.get(&config.connector) else {
                self.diagnostic(
                    "config",
                    format!("skipping `{id}`: unknown connector `{}`", config.connector),
                );
                continue;
            };
            let instance = config.instance_id();
            if loaded.contains_key(&instance) {
                self.diagnostic(
                    "config",
                    format!("skipping `{id}`: duplicate instance {instance}"),
                );
                continue;
            }
            loaded.insert(
                instance,
                LoadedDocument {
                    config,
                    connector,
                    hash: document_hash(&bytes),
                },
            );
        }
        Ok(loaded)
    }

    /// Diff freshly loaded documents against the current instance set:
    /// add new, drop disappeared, replace changed. A worker belonging to a
    /// dropped or replaced instance finishes on the draining list and its
    /// pointer is persisted by the run itself.
    #[instrument(skip(self), err)]
    async fn sync_instances(&mut self) -> Result<(), SchedulerError> {
        let mut loaded = self.load_documents().await?;

        let existing: Vec<InstanceId> = self.instances.keys().cloned().collect();
        for id in existing {
            match loaded.remove(&id) {
                None => {
                    if let Some(mut state) = self.instances.remove(&id) {
                        if let Some(worker) = state.worker.take() {
                            self.draining.push((id.clone(), worker));
                        }
                    }
                    self.diagnostic("scheduler", format!("instance removed: {id}"));
                }
                Some(doc) => {
                    let mut drained = None;
                    let mut replaced = false;
                    if let Some(state) = self.instances.get_mut(&id) {
                        if state.document_hash != doc.hash {
                            drained = state.worker.take();
                            state.config = Arc::new(doc.config);
                            state.connector = doc.connector;
                            state.document_hash = doc.hash;
                            state.last_run = None;
                            replaced = true;
                        }
                    }
                    if let Some(worker) = drained {
                        self.draining.push((id.clone(), worker));
                    }
                    if replaced {
                        self.diagnostic("scheduler", format!("instance replaced: {id}"));
                    }
                }
            }
        }

        for (id, doc) in loaded {
            self.diagnostic("scheduler", format!("instance added: {id}"));
            self.instances.insert(
                id,
                InstanceState {
                    config: Arc::new(doc.config),
                    connector: doc.connector,
                    document_hash: doc.hash,
                    last_run: None,
                    worker: None,
                },
            );
        }

        Ok(())
    }

    fn spawn_worker(&mut self, id: &InstanceId, with_deadline: bool) {
        let Some(state) = self.instances.get_mut(id) else {
            return;
        };
        let deadline = with_deadline.then(|| {
            let seconds =
                (state.frequency() as i64 - DEADLINE_MARGIN_SECONDS).max(MIN_DEADLINE_SECONDS);
            Utc::now() + chrono::Duration::seconds(seconds)
        });
        let pipeline = Arc::clone(&self.pipeline);
        let connector = Arc::clone(&state.connector);
        let config = Arc::clone(&state.config);
        let cancel = self.cancel_rx.clone();
        let limiter = self.limiter.clone();
        state.last_run = Some(Instant::now());
        state.worker = Some(tokio::spawn(async move {
            let _permit = match &limiter {
                Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                None => None,
            };
            pipeline.run(connector, &config, cancel, deadline).await
        }));
    }

    /// Collect finished workers into the report.
    async fn reap(&mut self, report: &mut SchedulerReport) {
        let finished: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, state)| {
                state
                    .worker
                    .as_ref()
                    .is_some_and(tokio::task::JoinHandle::is_finished)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in finished {
            if let Some(worker) = self
                .instances
                .get_mut(&id)
                .and_then(|state| state.worker.take())
            {
                report.absorb(&id, worker.await);
            }
        }

        let mut still_draining = Vec::new();
        for (id, worker) in self.draining.drain(..) {
            if worker.is_finished() {
                report.absorb(&id, worker.await);
            } else {
                still_draining.push((id, worker));
            }
        }
        self.draining = still_draining;
    }

    /// Run every instance once, wait for all of them, and report.
    ///
    /// Runs carry no deadline in this mode; a long backfill is allowed to
    /// take as long as it takes.
    #[instrument(skip(self), err)]
    pub async fn run_once(&mut self) -> Result<SchedulerReport, SchedulerError> {
        self.sync_instances().await?;
        if self.instances.is_empty() {
            return Err(SchedulerError::NoInstances);
        }
        info!(instances = self.instances.len(), "one-shot collection starting");

        let ids: Vec<InstanceId> = self.instances.keys().cloned().collect();
        for id in &ids {
            self.spawn_worker(id, false);
        }

        let mut report = SchedulerReport::default();
        for id in ids {
            if let Some(worker) = self
                .instances
                .get_mut(&id)
                .and_then(|state| state.worker.take())
            {
                report.absorb(&id, worker.await);
            }
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            records = report.records,
            "one-shot collection finished"
        );
        Ok(report)
    }

    /// Long-running loop: dispatch due instances once a second, refresh
    /// configuration on its own cadence, exit on SIGINT/SIGTERM.
    #[instrument(skip(self), err)]
    pub async fn run_daemon(&mut self) -> Result<SchedulerReport, SchedulerError> {
        self.sync_instances().await?;
        if self.instances.is_empty() {
            return Err(SchedulerError::NoInstances);
        }
        info!(
            instances = self.instances.len(),
            refresh = ?self.options.refresh_interval,
            "daemon starting"
        );

        let mut report = SchedulerReport::default();
        let mut dispatch = tokio::time::interval(Duration::from_secs(1));
        let mut refresh = tokio::time::interval_at(
            tokio::time::Instant::now() + self.options.refresh_interval,
            self.options.refresh_interval,
        );
        let mut shutdown = std::pin::pin!(shutdown_signal());
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                _ = stop_rx.changed() => {
                    info!("stop requested");
                    break;
                }
                _ = dispatch.tick() => {
                    self.reap(&mut report).await;
                    let due: Vec<InstanceId> = self
                        .instances
                        .iter()
                        .filter(|(_, state)| state.due())
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in due {
                        self.spawn_worker(&id, true);
                    }
                }
                _ = refresh.tick() => {
                    if let Err(err) = self.sync_instances().await {
                        warn!(error = %err, "config refresh failed; keeping current instances");
                    }
                }
            }
        }

        self.shutdown(&mut report).await;
        Ok(report)
    }

    /// Stop accepting runs, signal cancellation, and wait out the grace
    /// period. Stragglers are aborted; their pointers sit at the last
    /// successful checkpoint by construction.
    async fn shutdown(&mut self, report: &mut SchedulerReport) {
        let _ = self.cancel_tx.send(true);

        let mut workers: Vec<(InstanceId, JoinHandle<Result<RunOutcome, RunError>>)> = Vec::new();
        for (id, state) in self.instances.iter_mut() {
            if let Some(worker) = state.worker.take() {
                workers.push((id.clone(), worker));
            }
        }
        workers.append(&mut self.draining);

        let deadline = tokio::time::Instant::now() + self.options.shutdown_grace;
        for (id, worker) in workers {
            let abort = worker.abort_handle();
            match tokio::time::timeout_at(deadline, worker).await {
                Ok(result) => report.absorb(&id, result),
                Err(_) => {
                    warn!(instance = %id, "run ignored cancellation past the grace period; aborting");
                    abort.abort();
                    report.cancelled += 1;
                }
            }
        }
        self.diagnostic("scheduler", "daemon stopped");
    }

    fn diagnostic(&self, scope: &str, message: impl Into<String>) {
        let message = message.into();
        info!(scope, "{message}");
        let _ = self.emitter.emit(Event::diagnostic(scope, message));
    }
}

/// Resolves when the process receives SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
