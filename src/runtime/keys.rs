//! Cache record layout: pointer and lock key construction.
//!
//! Identities are free-form operator strings (e-mail addresses, tenant URLs)
//! while many key-value stores restrict key length and alphabet, so the
//! identity component is always an md5 hex digest. The `pointer.` and
//! `lock.` namespaces share the same shape and differ only in prefix.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Lowercase hex md5 of an instance identity.
#[must_use]
pub fn identity_hash(identity: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(identity.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Partition key for an instance's pointer: `pointer.<connector>.<md5(identity)>`.
#[must_use]
pub fn pointer_pk(connector: &str, identity: &str) -> String {
    format!("pointer.{connector}.{}", identity_hash(identity))
}

/// Partition key for an instance's running marker: `lock.<connector>.<md5(identity)>`.
#[must_use]
pub fn lock_pk(connector: &str, identity: &str) -> String {
    format!("lock.{connector}.{}", identity_hash(identity))
}

/// The running marker stored under a lock key.
///
/// Carries the owner's runtime identifier and the deadline past which
/// another process may reclaim the instance. Serialized as JSON so any
/// string-valued cache backend can hold it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockMarker {
    pub runtime: String,
    pub deadline: DateTime<Utc>,
}

impl LockMarker {
    pub fn new(runtime: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            runtime: runtime.into(),
            deadline,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a stored marker. `None` for values this version cannot read;
    /// callers treat those as reclaimable.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }
}
