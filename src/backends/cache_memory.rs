//! In-process cache backend, the default for local runs and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{BackendError, CacheBackend, Result, SetConstraint};

/// Volatile cache over a locked map.
///
/// Conditional writes are atomic under the write lock, which is what the
/// lock-marker protocol needs inside one process. Pointers stored here do
/// not survive a restart; production deployments register a durable cache
/// under their own handler name.
#[derive(Default)]
pub struct MemoryCacheBackend {
    inner: RwLock<FxHashMap<(String, String), String>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<String>> {
        let map = self.inner.read();
        Ok(map.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    async fn set(&self, pk: &str, sk: &str, value: &str, constraint: SetConstraint) -> Result<()> {
        let mut map = self.inner.write();
        let slot = (pk.to_string(), sk.to_string());
        let current = map.get(&slot);
        let ok = match &constraint {
            SetConstraint::None => true,
            SetConstraint::Absent => current.is_none(),
            SetConstraint::Equals(expected) => current.map(String::as_str) == Some(expected),
        };
        if !ok {
            return Err(BackendError::Conflict {
                pk: pk.to_string(),
                sk: sk.to_string(),
            });
        }
        map.insert(slot, value.to_string());
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        let mut map = self.inner.write();
        map.remove(&(pk.to_string(), sk.to_string()));
        Ok(())
    }
}
