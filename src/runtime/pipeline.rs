//! The record pipeline: one run of one connector instance.
//!
//! A run is lock → secrets → pointer → collect → process → stamp → emit →
//! checkpoint → release. The connector drives the middle of that loop by
//! calling [`CollectContext::emit`] once per batch; everything downstream of
//! the fetch happens inside the helper, so a batch is durable and its
//! pointer checkpointed before the connector fetches the next page. The
//! pointer is never advanced past records that were not acknowledged by the
//! output backend, which is the invariant the rest of the system leans on:
//! failures produce duplicates, never loss.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::backends::{BackendError, CacheBackend, OutputBackend, SecretBackend, SetConstraint};
use crate::config::{ConfigError, ConnectorConfig, Encoding, InstanceId};
use crate::connectors::{Connector, ConnectorError};
use crate::events::{Event, EventEmitter};
use crate::processors::{Processor, ProcessorError, ProcessorRegistry, apply_chain};
use crate::provenance::{Provenance, stamp};
use crate::runtime::keys::{self, LockMarker};
use crate::util::ids;
use crate::util::path::FieldPath;

/// Floor for lock-marker deadlines, seconds.
const MIN_LOCK_SECONDS: i64 = 60;

/// Per-call ceiling on individual backend operations.
const BACKEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

async fn timed<T>(
    op: &'static str,
    fut: impl Future<Output = crate::backends::Result<T>>,
) -> crate::backends::Result<T> {
    match tokio::time::timeout(BACKEND_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Unavailable {
            message: format!("{op} timed out after {BACKEND_TIMEOUT:?}"),
        }),
    }
}

/// Errors that end a run. The first one wins; the pointer stays at the last
/// successful checkpoint.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("secret resolution failed: {message}")]
    #[diagnostic(
        code(grove::run::secret),
        help("The run did not start; it is retried on the next tick.")
    )]
    Secret { message: String },

    #[error("upstream failure: {message} (transient: {transient})")]
    #[diagnostic(code(grove::run::upstream))]
    Upstream { transient: bool, message: String },

    #[error("backend failure during {during}: {source}")]
    #[diagnostic(
        code(grove::run::backend),
        help("A checkpoint failure after a successful emit re-emits the same window next run.")
    )]
    Backend {
        during: &'static str,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Processor(#[from] ProcessorError),

    #[error("record serialization failed: {0}")]
    #[diagnostic(code(grove::run::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error("artifact framing failed: {0}")]
    #[diagnostic(code(grove::run::framing))]
    Framing(#[source] std::io::Error),

    #[error("run cancelled at batch boundary")]
    #[diagnostic(code(grove::run::cancelled))]
    Cancelled,
}

impl RunError {
    /// Cancellation is an orderly stop, not a failure; everything else is.
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunError::Cancelled)
    }
}

/// What one run produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Records emitted across all batches.
    pub records: u64,
    /// Batches written to the output backend.
    pub batches: u64,
    /// Last checkpointed pointer, when any batch was written.
    pub pointer: Option<String>,
    /// The run was skipped because another process holds the lock.
    pub skipped: bool,
}

impl RunOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Executes runs against a fixed set of backends.
///
/// One pipeline is shared by every instance the scheduler owns; per-run
/// state lives in the [`CollectContext`] handed to the connector.
pub struct Pipeline {
    cache: Arc<dyn CacheBackend>,
    output: Arc<dyn OutputBackend>,
    secrets: Option<Arc<dyn SecretBackend>>,
    processors: ProcessorRegistry,
    emitter: EventEmitter,
    runtime: FxHashMap<String, String>,
    runtime_id: String,
}

impl Pipeline {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        output: Arc<dyn OutputBackend>,
        secrets: Option<Arc<dyn SecretBackend>>,
        processors: ProcessorRegistry,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            cache,
            output,
            secrets,
            processors,
            emitter,
            runtime: FxHashMap::default(),
            runtime_id: ids::runtime_id(),
        }
    }

    /// Free-form runtime identifiers stamped into record provenance
    /// (process ids, function names, hosts).
    #[must_use]
    pub fn with_runtime(mut self, runtime: FxHashMap<String, String>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Identifier written into lock markers owned by this process.
    #[must_use]
    pub fn with_runtime_id(mut self, runtime_id: impl Into<String>) -> Self {
        self.runtime_id = runtime_id.into();
        self
    }

    /// Execute one run of one instance.
    ///
    /// `cancel` flips when the scheduler shuts down; it is observed at batch
    /// boundaries. `deadline`, when set, bounds the run the same way
    /// (daemon-mode runs must not outlive their cadence).
    #[instrument(skip_all, fields(instance = %config.instance_id()), err)]
    pub async fn run(
        &self,
        connector: Arc<dyn Connector>,
        config: &ConnectorConfig,
        cancel: watch::Receiver<bool>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<RunOutcome, RunError> {
        let started = Utc::now();
        let run_id = ids::run_id();
        let instance = config.instance_id();
        let frequency = config
            .frequency
            .unwrap_or_else(|| connector.default_frequency());
        let lock_pk = keys::lock_pk(&config.connector, &config.identity);
        let sort_key = config.operation().to_string();

        if !self.acquire_lock(&lock_pk, &sort_key, started, frequency).await? {
            self.log(
                &instance,
                &run_id,
                "lock",
                "skipped: another process is collecting",
            );
            return Ok(RunOutcome::skipped());
        }

        let result = self
            .run_locked(connector, config, &instance, &run_id, started, cancel, deadline)
            .await;

        // Best-effort release; an expired marker is reclaimable anyway.
        if let Err(err) = timed("lock release", self.cache.delete(&lock_pk, &sort_key)).await {
            warn!(instance = %instance, error = %err, "failed to release running marker");
        }

        result
    }

    /// Mark the instance as running, reclaiming expired or unreadable
    /// markers. `false` means another process won the slot.
    async fn acquire_lock(
        &self,
        pk: &str,
        sk: &str,
        now: DateTime<Utc>,
        frequency: u64,
    ) -> Result<bool, RunError> {
        let deadline = now + Duration::seconds((frequency as i64).max(MIN_LOCK_SECONDS));
        let marker = LockMarker::new(self.runtime_id.clone(), deadline).encode();

        match timed("lock acquire", self.cache.set(pk, sk, &marker, SetConstraint::Absent)).await {
            Ok(()) => return Ok(true),
            Err(BackendError::Conflict { .. }) => {}
            Err(source) => return Err(RunError::Backend { during: "lock", source }),
        }

        let current = timed("lock read", self.cache.get(pk, sk))
            .await
            .map_err(|source| RunError::Backend { during: "lock", source })?;
        let Some(raw) = current else {
            // Released between our attempts; one more try.
            return match timed("lock acquire", self.cache.set(pk, sk, &marker, SetConstraint::Absent))
                .await
            {
                Ok(()) => Ok(true),
                Err(BackendError::Conflict { .. }) => Ok(false),
                Err(source) => Err(RunError::Backend { during: "lock", source }),
            };
        };

        let reclaimable = LockMarker::decode(&raw)
            .map(|held| held.is_expired(now))
            .unwrap_or(true);
        if !reclaimable {
            return Ok(false);
        }
        // Conditional replace of the exact observed value: two reclaimers
        // cannot both win.
        match timed(
            "lock reclaim",
            self.cache.set(pk, sk, &marker, SetConstraint::Equals(raw)),
        )
        .await
        {
            Ok(()) => Ok(true),
            Err(BackendError::Conflict { .. }) => Ok(false),
            Err(source) => Err(RunError::Backend { during: "lock", source }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_locked(
        &self,
        connector: Arc<dyn Connector>,
        config: &ConnectorConfig,
        instance: &InstanceId,
        run_id: &str,
        started: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<RunOutcome, RunError> {
        let credentials = self.resolve_credentials(config).await?;

        let pointer_pk = keys::pointer_pk(&config.connector, &config.identity);
        let sort_key = config.operation().to_string();
        let previous_pointer = timed("pointer load", self.cache.get(&pointer_pk, &sort_key))
            .await
            .map_err(|source| RunError::Backend { during: "pointer load", source })?;
        let pointer = previous_pointer
            .clone()
            .unwrap_or_else(|| connector.initial_pointer().resolve(started));

        let chain = self.processors.build_chain(&config.processors)?;

        let mut ctx = CollectContext {
            run_id: run_id.to_string(),
            started,
            config,
            instance: instance.clone(),
            credentials,
            pointer,
            previous_pointer: previous_pointer.clone(),
            pointer_path: connector.pointer_path().map(FieldPath::parse),
            chain,
            cache: Arc::clone(&self.cache),
            output: Arc::clone(&self.output),
            emitter: self.emitter.clone(),
            runtime: self.runtime.clone(),
            cancel,
            deadline,
            pointer_pk,
            sort_key,
            seq: 0,
            records: 0,
            checkpointed: None,
            failure: None,
        };

        ctx.log("run", format!("started, pointer={}", ctx.pointer));

        let result = match connector.collect(&mut ctx).await {
            Ok(()) => match ctx.failure.take() {
                // An emit failed but the connector returned Ok anyway; the
                // stored cause is authoritative.
                Some(failure) => Err(failure),
                None => Ok(()),
            },
            Err(ConnectorError::Aborted) => Err(ctx.failure.take().unwrap_or(RunError::Cancelled)),
            Err(err) => Err(RunError::Upstream {
                transient: err.is_transient(),
                message: err.to_string(),
            }),
        };

        match result {
            Ok(()) => {
                ctx.log(
                    "run",
                    format!("completed: {} records in {} batches", ctx.records, ctx.seq),
                );
                Ok(RunOutcome {
                    records: ctx.records,
                    batches: ctx.seq,
                    pointer: ctx.checkpointed.clone(),
                    skipped: false,
                })
            }
            Err(err) => {
                // Full provenance on every run failure: instance identity,
                // run id, and the pointer the run started from.
                ctx.log(
                    "run",
                    format!(
                        "failed: {err} (previous_pointer={})",
                        previous_pointer.as_deref().unwrap_or("<none>")
                    ),
                );
                Err(err)
            }
        }
    }

    /// Merge inline credentials with freshly fetched secrets. Secrets are
    /// fetched every run, never cached, so rotation works without notice.
    async fn resolve_credentials(
        &self,
        config: &ConnectorConfig,
    ) -> Result<FxHashMap<String, String>, RunError> {
        let mut credentials = FxHashMap::default();
        if let Some(key) = &config.key {
            credentials.insert("key".to_string(), key.clone());
        }
        if config.secrets.is_empty() {
            return Ok(credentials);
        }
        let Some(backend) = &self.secrets else {
            return Err(RunError::Secret {
                message: "configuration names secrets but no secret backend is configured"
                    .to_string(),
            });
        };
        let mut entries: Vec<(&String, &String)> = config.secrets.iter().collect();
        entries.sort();
        for (field, path) in entries {
            let bytes = timed("secret fetch", backend.fetch(path))
                .await
                .map_err(|err| RunError::Secret {
                message: format!("fetch of `{path}` failed: {err}"),
            })?;
            let value = String::from_utf8(bytes).map_err(|_| RunError::Secret {
                message: format!("secret `{path}` is not valid UTF-8"),
            })?;
            credentials.insert(field.clone(), value);
        }
        Ok(credentials)
    }

    fn log(&self, instance: &InstanceId, run_id: &str, scope: &str, message: impl Into<String>) {
        if let Err(err) = self
            .emitter
            .emit(Event::run(instance.to_string(), run_id, scope, message))
        {
            debug!(error = %err, "event bus unavailable");
        }
    }
}

/// Per-run state and helpers handed to the connector body.
///
/// The emit helper runs the whole downstream pipeline for each batch:
/// processor chain, provenance stamping, artifact framing, the durable
/// write, and the pointer checkpoint. Once any emit fails, every later emit
/// in the same run is refused so the pointer cannot skew past a lost batch.
pub struct CollectContext<'a> {
    run_id: String,
    started: DateTime<Utc>,
    config: &'a ConnectorConfig,
    instance: InstanceId,
    credentials: FxHashMap<String, String>,
    pointer: String,
    previous_pointer: Option<String>,
    pointer_path: Option<FieldPath>,
    chain: Vec<Box<dyn Processor>>,
    cache: Arc<dyn CacheBackend>,
    output: Arc<dyn OutputBackend>,
    emitter: EventEmitter,
    runtime: FxHashMap<String, String>,
    cancel: watch::Receiver<bool>,
    deadline: Option<DateTime<Utc>>,
    pointer_pk: String,
    sort_key: String,
    seq: u64,
    records: u64,
    checkpointed: Option<String>,
    failure: Option<RunError>,
}

impl CollectContext<'_> {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// The configuration document, open `extra` fields included.
    pub fn config(&self) -> &ConnectorConfig {
        self.config
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// The current pointer: where collection should resume.
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// The pointer as it stood at run start; `None` on a first run.
    pub fn previous_pointer(&self) -> Option<&str> {
        self.previous_pointer.as_deref()
    }

    /// A resolved credential by logical field name; inline `key` material
    /// lives under `"key"`.
    pub fn credential(&self, field: &str) -> Option<&str> {
        self.credentials.get(field).map(String::as_str)
    }

    pub fn credentials(&self) -> &FxHashMap<String, String> {
        &self.credentials
    }

    /// True once shutdown has been signalled or the run deadline passed.
    /// Checked automatically at every emit; long fetch loops should also
    /// poll it between upstream calls.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.deadline.is_some_and(|deadline| Utc::now() >= deadline)
    }

    /// Derive the candidate pointer from the last record of a page using the
    /// connector's declared pointer path.
    pub fn pointer_from(&self, records: &[Value]) -> Option<String> {
        let path = self.pointer_path.as_ref()?;
        let last = records.last()?;
        match path.resolve(last)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Emit an instance-scoped event.
    pub fn log(&self, scope: impl Into<String>, message: impl Into<String>) {
        if let Err(err) = self.emitter.emit(Event::run(
            self.instance.to_string(),
            self.run_id.clone(),
            scope,
            message,
        )) {
            debug!(error = %err, "event bus unavailable");
        }
    }

    /// Emit one batch and checkpoint the pointer it certifies.
    ///
    /// An empty batch is a no-op: nothing is written and the pointer does
    /// not advance. On any failure the error is recorded, the batch is
    /// dropped, and [`ConnectorError::Aborted`] tells the body to stop.
    pub async fn emit(
        &mut self,
        batch: Vec<Value>,
        new_pointer: impl Into<String>,
    ) -> Result<(), ConnectorError> {
        if self.failure.is_some() {
            return Err(ConnectorError::Aborted);
        }
        if self.is_cancelled() {
            self.failure = Some(RunError::Cancelled);
            return Err(ConnectorError::Aborted);
        }
        if batch.is_empty() {
            return Ok(());
        }
        let new_pointer = new_pointer.into();

        let processed = match apply_chain(&self.chain, batch) {
            Ok(processed) => processed,
            Err(err) => {
                self.failure = Some(RunError::Processor(err));
                return Err(ConnectorError::Aborted);
            }
        };
        if processed.is_empty() {
            self.log("emit", "batch empty after processing; nothing written");
            return Ok(());
        }

        match self.write_batch(processed, &new_pointer).await {
            Ok(count) => {
                self.pointer = new_pointer.clone();
                self.checkpointed = Some(new_pointer);
                self.records += count;
                self.seq += 1;
                Ok(())
            }
            Err(err) => {
                self.failure = Some(err);
                Err(ConnectorError::Aborted)
            }
        }
    }

    async fn write_batch(&mut self, batch: Vec<Value>, new_pointer: &str) -> Result<u64, RunError> {
        let provenance = Provenance {
            connector: self.config.connector.clone(),
            identity: self.config.identity.clone(),
            operation: self.sort_key.clone(),
            pointer: new_pointer.to_string(),
            previous_pointer: self.previous_pointer.clone(),
            collection_time: self.started,
            runtime: self.runtime.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let mut lines: Vec<u8> = Vec::new();
        let mut count = 0u64;
        for mut record in batch {
            stamp(&mut record, &provenance)?;
            serde_json::to_writer(&mut lines, &record)?;
            lines.push(b'\n');
            count += 1;
        }

        let bytes = match self.config.encoding {
            Encoding::GzipNdjson => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&lines).map_err(RunError::Framing)?;
                encoder.finish().map_err(RunError::Framing)?
            }
            Encoding::Ndjson => lines,
        };

        let key = self.artifact_key();
        let mut metadata = FxHashMap::default();
        metadata.insert("connector".to_string(), self.config.connector.clone());
        metadata.insert("identity".to_string(), self.config.identity.clone());
        metadata.insert("operation".to_string(), self.sort_key.clone());
        metadata.insert("run_id".to_string(), self.run_id.clone());

        // Write strictly before checkpoint: the pointer may only ever refer
        // to records the output backend has acknowledged.
        timed("artifact write", self.output.write(&key, bytes, &metadata))
            .await
            .map_err(|source| RunError::Backend { during: "emit", source })?;

        timed(
            "pointer checkpoint",
            self.cache
                .set(&self.pointer_pk, &self.sort_key, new_pointer, SetConstraint::None),
        )
        .await
        .map_err(|source| RunError::Backend { during: "checkpoint", source })?;

        self.log(
            "emit",
            format!("batch {} written: {count} records, key={key}", self.seq + 1),
        );
        Ok(count)
    }

    fn artifact_key(&self) -> String {
        format!(
            "{}/{}/{}/{}_{:04}.{}",
            self.config.connector,
            self.config.identity,
            self.sort_key,
            self.started.format("%Y/%m/%d/%H%M%S"),
            self.seq,
            self.config.encoding.extension()
        )
    }
}
