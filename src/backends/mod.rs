//! Backend contracts: the four pluggable dependencies of the engine.
//!
//! Every external dependency of the core sits behind one of four narrow
//! traits: configuration storage, the pointer/lock cache, record output, and
//! secret resolution. Implementations may perform I/O; callers treat every
//! operation as fallible with a typed [`BackendError`]. The bundled local
//! implementations (directory configs, in-process cache, stdout/directory
//! output, file secrets) keep the engine runnable with no infrastructure;
//! anything heavier registers through [`HandlerRegistry`] under its own name.

mod cache_memory;
mod config_fs;
mod output_fs;
mod output_stdout;
mod secret_fs;

pub use cache_memory::MemoryCacheBackend;
pub use config_fs::FsConfigBackend;
pub use output_fs::FsOutputBackend;
pub use output_stdout::StdOutOutputBackend;
pub use secret_fs::FsSecretBackend;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors surfaced by backend operations.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    /// The addressed item does not exist.
    #[error("not found: {what}")]
    #[diagnostic(code(grove::backend::not_found))]
    NotFound { what: String },

    /// A conditional cache write lost to a concurrent writer.
    #[error("conditional write conflict on {pk}/{sk}")]
    #[diagnostic(
        code(grove::backend::conflict),
        help("Another process holds this slot; the caller usually skips the run.")
    )]
    Conflict { pk: String, sk: String },

    #[error(transparent)]
    #[diagnostic(code(grove::backend::io))]
    Io(#[from] std::io::Error),

    /// The backend itself could not be reached.
    #[error("backend unavailable: {message}")]
    #[diagnostic(code(grove::backend::unavailable))]
    Unavailable { message: String },

    #[error("backend error: {message}")]
    #[diagnostic(code(grove::backend::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Optimistic-concurrency constraint for [`CacheBackend::set`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetConstraint {
    /// Unconditional write.
    None,
    /// Succeed only when no value exists for the slot.
    Absent,
    /// Succeed only when the current value equals this string.
    Equals(String),
}

/// Stores and lists raw configuration documents. The core parses and
/// validates; the backend only stores. Listing must be stable modulo
/// genuine changes.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
    async fn get(&self, id: &str) -> Result<Vec<u8>>;
}

/// Pointer and lock storage.
///
/// The conditional `set` is the sole primitive the scheduler uses to
/// guarantee at-most-one concurrent run per instance; a violated constraint
/// must surface as [`BackendError::Conflict`]. Read-your-writes within one
/// process is required; cross-process linearizability is not.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<String>>;
    async fn set(&self, pk: &str, sk: &str, value: &str, constraint: SetConstraint) -> Result<()>;
    async fn delete(&self, pk: &str, sk: &str) -> Result<()>;
}

/// Destination for emitted artifacts. Writes must be durable before `Ok`;
/// the caller checkpoints the pointer immediately after. The metadata
/// mapping is best-effort (object tags and the like).
#[async_trait]
pub trait OutputBackend: Send + Sync {
    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        metadata: &FxHashMap<String, String>,
    ) -> Result<()>;
}

/// Resolves secret lookup paths to secret bytes.
///
/// Called every connector run, never cached, so dynamic-secret engines and
/// rotation work without notification.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

type HandlerCtor<T> = Arc<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// Registry mapping a handler name to a backend constructor.
///
/// One registry exists per backend role; each linked-in module registers its
/// constructor at process startup and the entrypoints resolve
/// `GROVE_<ROLE>_HANDLER` against it. Constructors read their own
/// `GROVE_<ROLE>_<BACKEND>_<PARAM>` environment variables.
pub struct HandlerRegistry<T: ?Sized> {
    ctors: FxHashMap<String, HandlerCtor<T>>,
}

impl<T: ?Sized> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self {
            ctors: FxHashMap::default(),
        }
    }
}

impl<T: ?Sized> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Arc::new(ctor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the named backend.
    pub fn build(&self, name: &str) -> Result<Arc<T>> {
        let ctor = self.ctors.get(name).ok_or_else(|| BackendError::NotFound {
            what: format!("handler `{name}`"),
        })?;
        ctor()
    }
}
