//! Environment-driven backend wiring.
//!
//! Each backend role resolves through `GROVE_<ROLE>_HANDLER` against a
//! [`HandlerRegistry`] populated at process startup. The bundled local
//! handlers keep a bare process runnable; production deployments register
//! their own constructors under new names and flip an environment variable.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::backends::{
    BackendError, CacheBackend, ConfigBackend, FsConfigBackend, FsOutputBackend, FsSecretBackend,
    HandlerRegistry, MemoryCacheBackend, OutputBackend, SecretBackend, StdOutOutputBackend,
};

pub const CONFIG_HANDLER_VAR: &str = "GROVE_CONFIG_HANDLER";
pub const CACHE_HANDLER_VAR: &str = "GROVE_CACHE_HANDLER";
pub const OUTPUT_HANDLER_VAR: &str = "GROVE_OUTPUT_HANDLER";
pub const SECRET_HANDLER_VAR: &str = "GROVE_SECRET_HANDLER";

const DEFAULT_CONFIG_HANDLER: &str = "local_file";
const DEFAULT_CACHE_HANDLER: &str = "local_memory";
const DEFAULT_OUTPUT_HANDLER: &str = "local_stdout";

/// A handler could not be resolved or constructed. Entrypoints map this to
/// exit code 3.
#[derive(Debug, Error, Diagnostic)]
pub enum HandlerError {
    #[error("unknown {role} handler `{name}` (available: {available})")]
    #[diagnostic(
        code(grove::handlers::unknown),
        help("Check the GROVE_{role}_HANDLER environment variable against the registered handlers.")
    )]
    Unknown {
        role: &'static str,
        name: String,
        available: String,
    },

    #[error("{role} handler `{name}` failed to initialize: {source}")]
    #[diagnostic(code(grove::handlers::init))]
    Init {
        role: &'static str,
        name: String,
        #[source]
        source: BackendError,
    },
}

/// The four resolved backends handed to the scheduler.
pub struct Backends {
    pub config: Arc<dyn ConfigBackend>,
    pub cache: Arc<dyn CacheBackend>,
    pub output: Arc<dyn OutputBackend>,
    pub secret: Option<Arc<dyn SecretBackend>>,
}

/// One registry per backend role.
pub struct HandlerSet {
    pub configs: HandlerRegistry<dyn ConfigBackend>,
    pub caches: HandlerRegistry<dyn CacheBackend>,
    pub outputs: HandlerRegistry<dyn OutputBackend>,
    pub secrets: HandlerRegistry<dyn SecretBackend>,
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerSet {
    pub fn empty() -> Self {
        Self {
            configs: HandlerRegistry::new(),
            caches: HandlerRegistry::new(),
            outputs: HandlerRegistry::new(),
            secrets: HandlerRegistry::new(),
        }
    }

    /// Registries pre-populated with the bundled local handlers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut set = Self::empty();
        set.configs
            .register("local_file", || Ok(Arc::new(FsConfigBackend::from_env())));
        set.caches
            .register("local_memory", || Ok(Arc::new(MemoryCacheBackend::new())));
        set.outputs
            .register("local_stdout", || Ok(Arc::new(StdOutOutputBackend::new())));
        set.outputs
            .register("local_file", || Ok(Arc::new(FsOutputBackend::from_env())));
        set.secrets
            .register("local_file", || Ok(Arc::new(FsSecretBackend::from_env())));
        set
    }

    /// Resolve all four roles from the environment. `.env` files are
    /// honoured; a missing secret handler leaves the role unset, which is
    /// valid as long as every document carries inline credentials.
    pub fn resolve_from_env(&self) -> Result<Backends, HandlerError> {
        dotenvy::dotenv().ok();
        let config_name = std::env::var(CONFIG_HANDLER_VAR)
            .unwrap_or_else(|_| DEFAULT_CONFIG_HANDLER.to_string());
        let cache_name =
            std::env::var(CACHE_HANDLER_VAR).unwrap_or_else(|_| DEFAULT_CACHE_HANDLER.to_string());
        let output_name = std::env::var(OUTPUT_HANDLER_VAR)
            .unwrap_or_else(|_| DEFAULT_OUTPUT_HANDLER.to_string());
        let secret_name = std::env::var(SECRET_HANDLER_VAR).ok();

        let config = build(&self.configs, "CONFIG", &config_name)?;
        let cache = build(&self.caches, "CACHE", &cache_name)?;
        let output = build(&self.outputs, "OUTPUT", &output_name)?;
        let secret = match secret_name {
            Some(name) => Some(build(&self.secrets, "SECRET", &name)?),
            None => None,
        };

        Ok(Backends {
            config,
            cache,
            output,
            secret,
        })
    }
}

fn build<T: ?Sized>(
    registry: &HandlerRegistry<T>,
    role: &'static str,
    name: &str,
) -> Result<Arc<T>, HandlerError> {
    if !registry.contains(name) {
        return Err(HandlerError::Unknown {
            role,
            name: name.to_string(),
            available: registry.names().join(", "),
        });
    }
    registry.build(name).map_err(|source| HandlerError::Init {
        role,
        name: name.to_string(),
        source,
    })
}
