use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured telemetry emitted while the engine runs.
///
/// Two shapes exist: run-scoped events carry the instance and run id that
/// produced them so operators can trace a single collection end to end;
/// diagnostics cover everything else (scheduler lifecycle, backend wiring).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Run(RunEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn run(
        instance: impl Into<String>,
        run_id: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Run(RunEvent {
            instance: instance.into(),
            run_id: run_id.into(),
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope(&self) -> &str {
        match self {
            Event::Run(run) => &run.scope,
            Event::Diagnostic(diag) => &diag.scope,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Run(run) => &run.message,
            Event::Diagnostic(diag) => &diag.message,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Run(run) => write!(
                f,
                "[{}@{}] {}: {}",
                run.instance, run.run_id, run.scope, run.message
            ),
            Event::Diagnostic(diag) => write!(f, "{}: {}", diag.scope, diag.message),
        }
    }
}

/// Event tied to one run of one connector instance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub instance: String,
    pub run_id: String,
    pub scope: String,
    pub message: String,
}

/// Instance-agnostic event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}
