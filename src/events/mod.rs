//! Engine telemetry: structured events fanned out to pluggable sinks.
//!
//! The module is organised around an [`EventBus`] worker plus helpers for
//! configuring sinks and the clonable [`EventEmitter`] handle the pipeline
//! and connectors write through.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{EmitterError, EventBus, EventEmitter};
pub use event::{DiagnosticEvent, Event, RunEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
