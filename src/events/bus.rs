use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task;

use super::event::Event;
use super::sink::{EventSink, StdOutSink};

/// Errors that can occur when emitting an event.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event bus closed")]
    Closed,
}

/// Cheap, clonable handle used by pipelines and connectors to emit events.
///
/// Emission is non-blocking: the event is queued onto the bus channel and a
/// worker task fans it out to the configured sinks. A closed bus surfaces as
/// [`EmitterError::Closed`]; callers log and continue, telemetry loss never
/// fails a run.
#[derive(Clone)]
pub struct EventEmitter {
    tx: flume::Sender<Event>,
}

impl EventEmitter {
    pub fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.tx.send(event).map_err(|_| EmitterError::Closed)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

/// Fan-out point for engine telemetry.
///
/// The bus owns a set of [`EventSink`]s and a worker task that drains the
/// event channel and hands each event to every sink in order. Sinks may
/// perform blocking I/O; they run on the worker, never on the emitting task.
///
/// ```rust,no_run
/// use grove::events::{EventBus, MemorySink};
///
/// # async fn example() {
/// let sink = MemorySink::new();
/// let bus = EventBus::with_sinks(vec![Box::new(sink.clone())]);
/// let emitter = bus.emitter();
/// // hand `emitter` to the scheduler; inspect `sink.snapshot()` later
/// # }
/// ```
pub struct EventBus {
    tx: flume::Sender<Event>,
    worker: Mutex<Option<task::JoinHandle<()>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create a bus and start its fan-out worker. Must be called from within
    /// a tokio runtime.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (tx, rx) = flume::unbounded::<Event>();
        let sinks = Arc::new(Mutex::new(sinks));
        let worker_sinks = Arc::clone(&sinks);
        let handle = task::spawn(async move {
            while let Ok(event) = rx.recv_async().await {
                let mut guard = worker_sinks.lock();
                for sink in guard.iter_mut() {
                    if let Err(err) = sink.handle(&event) {
                        eprintln!("event sink {} error: {err}", sink.name());
                    }
                }
            }
        });
        Self {
            tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
        }
    }

    /// Drain outstanding events and stop the worker.
    ///
    /// Outstanding [`EventEmitter`] clones keep the channel open; the worker
    /// exits once the last one is dropped.
    pub async fn close(self) {
        let handle = self.worker.lock().take();
        drop(self);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
