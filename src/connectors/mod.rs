//! The connector contract and registry.
//!
//! A connector body knows how to fetch one run's worth of records from one
//! upstream service. It is handed a [`CollectContext`] with the current
//! pointer, resolved credentials, the configuration document, and an emit
//! helper; it must emit batches through the helper rather than accumulating
//! history in memory, which bounds memory and lets the pipeline checkpoint
//! incrementally.
//!
//! Concrete connector bodies live outside the core; they register here at
//! process startup under a stable name that configuration documents
//! reference.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use grove::connectors::{Connector, ConnectorError, InitialPointer};
//! use grove::runtime::CollectContext;
//! use serde_json::json;
//!
//! struct ExampleAudit;
//!
//! #[async_trait]
//! impl Connector for ExampleAudit {
//!     fn name(&self) -> &'static str {
//!         "example_audit"
//!     }
//!
//!     fn initial_pointer(&self) -> InitialPointer {
//!         InitialPointer::DaysAgo(7)
//!     }
//!
//!     fn pointer_path(&self) -> Option<&'static str> {
//!         Some("timestamp")
//!     }
//!
//!     async fn collect(
//!         &self,
//!         ctx: &mut CollectContext<'_>,
//!     ) -> Result<(), ConnectorError> {
//!         // One page per loop iteration against the real API; a fixed batch
//!         // here for brevity.
//!         let records = vec![json!({"timestamp": "1607425434", "action": "login"})];
//!         let pointer = ctx.pointer_from(&records).unwrap_or_default();
//!         ctx.emit(records, pointer).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::runtime::CollectContext;

/// Errors a connector body may return from a run.
///
/// The transient/permanent split drives operator expectations: transient
/// failures (network, 5xx, rate limits after internal retries gave up)
/// resolve themselves on a later tick, permanent ones (authorization, other
/// 4xx) need operator action. Either way the pointer stays where it was.
#[derive(Debug, Error, Diagnostic)]
pub enum ConnectorError {
    #[error("transient upstream error: {message}")]
    #[diagnostic(code(grove::connector::transient))]
    Transient { message: String },

    #[error("permanent upstream error: {message}")]
    #[diagnostic(
        code(grove::connector::permanent),
        help("Authorization and client errors need operator action; the instance stays scheduled.")
    )]
    Permanent { message: String },

    /// An emit failed or collection was cancelled; the pipeline holds the
    /// underlying cause. Propagate with `?` and stop fetching.
    #[error("collection aborted")]
    #[diagnostic(code(grove::connector::aborted))]
    Aborted,
}

impl ConnectorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Where collection starts when no pointer exists yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitialPointer {
    /// A fixed value the upstream API accepts.
    Literal(String),
    /// Epoch seconds, N days before run start.
    DaysAgo(i64),
}

impl InitialPointer {
    /// Render the initial pointer for a run starting at `now`.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> String {
        match self {
            InitialPointer::Literal(value) => value.clone(),
            InitialPointer::DaysAgo(days) => {
                (now - chrono::Duration::days(*days)).timestamp().to_string()
            }
        }
    }
}

/// A body of code that fetches records from one upstream service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable name referenced by configuration documents.
    fn name(&self) -> &'static str;

    /// Default seconds between runs when a document does not override it.
    fn default_frequency(&self) -> u64 {
        600
    }

    /// Initial pointer strategy for a first run.
    fn initial_pointer(&self) -> InitialPointer;

    /// Dotted record path from which the next pointer can be derived, when
    /// the API supports it. Connectors with token-based resumption return
    /// `None` and supply pointers explicitly on emit.
    fn pointer_path(&self) -> Option<&'static str> {
        None
    }

    /// Fetch one run's worth of records, emitting batches as they arrive.
    async fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<(), ConnectorError>;
}

/// Registry mapping connector names to bodies, populated at startup.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    bodies: FxHashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under its declared name. Later registrations
    /// replace earlier ones.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.bodies.insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.bodies.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bodies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
