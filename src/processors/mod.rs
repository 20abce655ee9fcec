//! Batch transformations applied between fetch and emit.
//!
//! A processor is a pure function over one batch of records: no external
//! state, no blocking, deterministic output for a fixed input. Chains are
//! declared per instance as an ordered list of [`ProcessorSpec`] documents
//! and applied in declaration order; a failure anywhere drops the whole
//! batch and the run's pointer is not advanced.

mod split;
mod zip;

pub use split::Split;
pub use zip::Zip;

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while building or applying a processor chain.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessorError {
    #[error("unknown processor: {name}")]
    #[diagnostic(
        code(grove::processors::unknown),
        help("Register the processor before referencing it in a configuration document.")
    )]
    UnknownProcessor { name: String },

    #[error("invalid spec for processor `{processor}`: {reason}")]
    #[diagnostic(code(grove::processors::invalid_spec))]
    InvalidSpec {
        processor: &'static str,
        reason: String,
    },

    #[error("processor `{processor}` failed: {message}")]
    #[diagnostic(code(grove::processors::apply))]
    Apply { processor: String, message: String },
}

/// A named, pure transformation over one batch of records.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    /// Transform the batch. Record order must be stable per the semantics of
    /// the individual processor; the chain relies on it.
    fn apply(&self, batch: Vec<Value>) -> Result<Vec<Value>, ProcessorError>;
}

/// One processor declaration inside a configuration document.
///
/// The `name` selects the registered constructor; everything else rides in
/// `params` and is interpreted by that constructor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessorSpec {
    pub name: String,
    #[serde(flatten)]
    pub params: FxHashMap<String, Value>,
}

impl ProcessorSpec {
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

type ProcessorCtor =
    Arc<dyn Fn(&ProcessorSpec) -> Result<Box<dyn Processor>, ProcessorError> + Send + Sync>;

/// Registry mapping processor names to constructors.
///
/// Populated at process startup; the built-ins are always present and
/// additional processors register identically.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    ctors: FxHashMap<String, ProcessorCtor>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `split` and `zip` processors.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("split", |spec| Ok(Box::new(Split::from_spec(spec)?)));
        registry.register("zip", |spec| Ok(Box::new(Zip::from_spec(spec)?)));
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&ProcessorSpec) -> Result<Box<dyn Processor>, ProcessorError> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Arc::new(ctor));
    }

    pub fn build(&self, spec: &ProcessorSpec) -> Result<Box<dyn Processor>, ProcessorError> {
        let ctor = self
            .ctors
            .get(&spec.name)
            .ok_or_else(|| ProcessorError::UnknownProcessor {
                name: spec.name.clone(),
            })?;
        ctor(spec)
    }

    /// Build the full chain for one instance, in declaration order.
    pub fn build_chain(
        &self,
        specs: &[ProcessorSpec],
    ) -> Result<Vec<Box<dyn Processor>>, ProcessorError> {
        specs.iter().map(|spec| self.build(spec)).collect()
    }
}

/// Run a batch through a chain in order.
pub fn apply_chain(
    chain: &[Box<dyn Processor>],
    mut batch: Vec<Value>,
) -> Result<Vec<Value>, ProcessorError> {
    for processor in chain {
        batch = processor.apply(batch)?;
    }
    Ok(batch)
}
