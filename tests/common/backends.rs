//! Recording and fault-injecting backend fixtures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use grove::backends::{
    BackendError, CacheBackend, MemoryCacheBackend, OutputBackend, Result, SecretBackend,
    SetConstraint,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Shared ordered log of backend operations, for ordering assertions.
pub type OpLog = Arc<Mutex<Vec<String>>>;

pub fn op_log() -> OpLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Output backend that records every write and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingOutput {
    pub writes: Arc<Mutex<Vec<(String, Vec<u8>, FxHashMap<String, String>)>>>,
    fail: Arc<AtomicBool>,
    log: Option<OpLog>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: OpLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.writes.lock().iter().map(|(key, _, _)| key.clone()).collect()
    }
}

#[async_trait]
impl OutputBackend for RecordingOutput {
    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        metadata: &FxHashMap<String, String>,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable {
                message: "injected output failure".to_string(),
            });
        }
        if let Some(log) = &self.log {
            log.lock().push(format!("write:{key}"));
        }
        self.writes
            .lock()
            .push((key.to_string(), bytes, metadata.clone()));
        Ok(())
    }
}

/// Cache wrapper that logs pointer checkpoints into the shared op log.
pub struct LoggingCache {
    inner: MemoryCacheBackend,
    log: OpLog,
}

impl LoggingCache {
    pub fn new(log: OpLog) -> Self {
        Self {
            inner: MemoryCacheBackend::new(),
            log,
        }
    }
}

#[async_trait]
impl CacheBackend for LoggingCache {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<String>> {
        self.inner.get(pk, sk).await
    }

    async fn set(&self, pk: &str, sk: &str, value: &str, constraint: SetConstraint) -> Result<()> {
        self.inner.set(pk, sk, value, constraint).await?;
        if pk.starts_with("pointer.") {
            self.log.lock().push(format!("checkpoint:{value}"));
        }
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        self.inner.delete(pk, sk).await
    }
}

/// Secret backend serving from an in-memory map.
#[derive(Clone, Default)]
pub struct MapSecrets {
    entries: Arc<Mutex<FxHashMap<String, Vec<u8>>>>,
}

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.lock().insert(path.into(), value.into());
    }
}

#[async_trait]
impl SecretBackend for MapSecrets {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                what: format!("secret `{path}`"),
            })
    }
}
