//! Identifier helpers for runs and runtimes.

use uuid::Uuid;

/// Generate a fresh run identifier.
///
/// Run ids are opaque; they exist so that every record and log line emitted
/// by one run of one instance can be correlated afterwards.
#[must_use]
pub fn run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a runtime identifier for this process.
///
/// Entrypoints that have a natural identity (a function invocation id, a
/// host name) supply their own; this is the fallback.
#[must_use]
pub fn runtime_id() -> String {
    format!("grove-{}", Uuid::new_v4())
}
