//! Shared entrypoint plumbing for the `grove` and `groved` binaries.
//!
//! Deployments embed the engine by registering their connector bodies and
//! calling one of these functions; the bundled binaries do exactly that
//! with an empty registry. All configuration is environmental.
//!
//! Exit codes: `0` success, `1` at least one instance fatally failed,
//! `2` no instances loaded at startup, `3` backend handler missing or
//! failed to initialize.

use rustc_hash::FxHashMap;
use tracing::error;

use crate::connectors::ConnectorRegistry;
use crate::events::EventBus;
use crate::processors::ProcessorRegistry;
use crate::runtime::handlers::HandlerSet;
use crate::runtime::pipeline::Pipeline;
use crate::runtime::scheduler::{Scheduler, SchedulerError, SchedulerOptions};

/// Which entrypoint is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Run every instance once and exit.
    OneShot,
    /// Loop until signalled.
    Daemon,
}

/// Build the engine from the environment and run it to completion.
///
/// `runtime` is stamped into record provenance; entrypoints put process or
/// function identifiers there.
pub async fn run(
    mode: Mode,
    connectors: ConnectorRegistry,
    runtime: FxHashMap<String, String>,
) -> i32 {
    let handlers = HandlerSet::with_builtins();
    let backends = match handlers.resolve_from_env() {
        Ok(backends) => backends,
        Err(err) => {
            error!("{err}");
            return 3;
        }
    };

    let bus = EventBus::default();
    let emitter = bus.emitter();
    let pipeline = Pipeline::new(
        backends.cache,
        backends.output,
        backends.secret,
        ProcessorRegistry::with_builtins(),
        emitter.clone(),
    )
    .with_runtime(runtime);

    let mut scheduler = Scheduler::new(
        backends.config,
        connectors,
        std::sync::Arc::new(pipeline),
        emitter,
        SchedulerOptions::from_env(),
    );

    let result = match mode {
        Mode::OneShot => scheduler.run_once().await,
        Mode::Daemon => scheduler.run_daemon().await,
    };

    let code = match result {
        Ok(report) => report.exit_code(),
        Err(err @ SchedulerError::NoInstances) => {
            error!("{err}");
            2
        }
        Err(err @ SchedulerError::Backend(_)) => {
            error!("{err}");
            3
        }
    };

    bus.close().await;
    code
}
