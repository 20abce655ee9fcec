//! # Grove: Periodic SaaS Log Collection Engine
//!
//! Grove pulls security-relevant audit events from SaaS providers that do
//! not natively stream logs and hands the collected records to downstream
//! sinks. Its value is reliability: each upstream source is polled on its
//! own cadence, progress is checkpointed so restarts do not lose ground,
//! and failures in one source do not stall the others. Duplicates are
//! permitted and preferred over loss.
//!
//! ## Core Concepts
//!
//! - **Connectors**: bodies of code that fetch one run's worth of records
//!   from one upstream service, identified by a stable name
//! - **Instances**: configuration documents bound to a connector, keyed by
//!   the (connector, identity, operation) triple
//! - **Pointers**: opaque resume tokens, written only after the batch that
//!   produced them is durably emitted
//! - **Backends**: four pluggable contracts (config, cache, output, secret)
//!   behind which every external dependency sits
//! - **Scheduler**: concurrent per-cadence execution with config refresh
//!   and graceful shutdown
//!
//! ## Quick Start
//!
//! Implement a connector, register it, and run a pipeline against the
//! bundled local backends:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use grove::backends::{MemoryCacheBackend, StdOutOutputBackend};
//! use grove::config::ConnectorConfig;
//! use grove::connectors::{Connector, ConnectorError, InitialPointer};
//! use grove::events::EventBus;
//! use grove::processors::ProcessorRegistry;
//! use grove::runtime::{CollectContext, Pipeline};
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
//!     async fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<(), ConnectorError> {
//!         // Query the upstream API from ctx.pointer() here.
//!         let records = vec![json!({"timestamp": "1607425434", "action": "login"})];
//!         ctx.emit(records, "1607425434").await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::default();
//!     let pipeline = Pipeline::new(
//!         Arc::new(MemoryCacheBackend::new()),
//!         Arc::new(StdOutOutputBackend::new()),
//!         None,
//!         ProcessorRegistry::with_builtins(),
//!         bus.emitter(),
//!     );
//!
//!     let config = ConnectorConfig::parse(
//!         br#"{
//!             "name": "example",
//!             "identity": "tenant.example.com",
//!             "connector": "example_audit",
//!             "key": "api-token"
//!         }"#,
//!     )
//!     .unwrap();
//!
//!     let (_cancel_tx, cancel) = tokio::sync::watch::channel(false);
//!     let outcome = pipeline
//!         .run(Arc::new(ExampleAudit), &config, cancel, None)
//!         .await
//!         .unwrap();
//!     println!("emitted {} records", outcome.records);
//! }
//! ```
//!
//! For a whole fleet, hand a populated
//! [`ConnectorRegistry`](connectors::ConnectorRegistry) to
//! [`runtime::entry::run`] and let the scheduler drive: the `grove` binary
//! runs every instance once and exits, `groved` loops until signalled, and
//! everything else is configured through `GROVE_*` environment variables.
//!
//! ## Module Guide
//!
//! - [`config`] - Configuration documents and instance identity
//! - [`connectors`] - The connector contract and registry
//! - [`processors`] - Pure batch transforms (`split`, `zip`, and friends)
//! - [`backends`] - The four backend contracts and local defaults
//! - [`events`] - Structured run telemetry fanned out to sinks
//! - [`runtime`] - The record pipeline, scheduler, and backend wiring
//! - [`provenance`] - The reserved `_grove` stamp on every record
//! - [`telemetry`] - Tracing setup for the entrypoints

pub mod backends;
pub mod config;
pub mod connectors;
pub mod events;
pub mod processors;
pub mod provenance;
pub mod runtime;
pub mod telemetry;
pub mod util;
