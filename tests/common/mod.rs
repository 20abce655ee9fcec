#![allow(dead_code)]

//! Shared fixtures: scripted connectors and recording backends.

pub mod backends;
pub mod connectors;

use std::io::Read;
use std::sync::Arc;

use grove::backends::{CacheBackend, OutputBackend, SecretBackend};
use grove::config::ConnectorConfig;
use grove::events::{EventBus, MemorySink};
use grove::processors::ProcessorRegistry;
use grove::runtime::Pipeline;
use tokio::sync::watch;

/// A cancellation receiver that never fires.
pub fn no_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    rx
}

/// Parse a JSON literal into a validated configuration document.
pub fn config_from(value: serde_json::Value) -> ConnectorConfig {
    ConnectorConfig::parse(&serde_json::to_vec(&value).unwrap()).unwrap()
}

/// Build a pipeline over the given backends with built-in processors and a
/// memory event sink. The returned bus must outlive the pipeline.
pub fn test_pipeline(
    cache: Arc<dyn CacheBackend>,
    output: Arc<dyn OutputBackend>,
    secrets: Option<Arc<dyn SecretBackend>>,
) -> (Pipeline, MemorySink, EventBus) {
    test_pipeline_with(cache, output, secrets, ProcessorRegistry::with_builtins())
}

pub fn test_pipeline_with(
    cache: Arc<dyn CacheBackend>,
    output: Arc<dyn OutputBackend>,
    secrets: Option<Arc<dyn SecretBackend>>,
    processors: ProcessorRegistry,
) -> (Pipeline, MemorySink, EventBus) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    let pipeline = Pipeline::new(cache, output, secrets, processors, bus.emitter());
    (pipeline, sink, bus)
}

/// Decode one artifact back into records, handling both framings.
pub fn artifact_records(key: &str, bytes: &[u8]) -> Vec<serde_json::Value> {
    let ndjson = if key.ends_with(".gz") {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    } else {
        bytes.to_vec()
    };
    String::from_utf8(ndjson)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
