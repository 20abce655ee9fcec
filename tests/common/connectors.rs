//! Scripted connector bodies for exercising the pipeline and scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use grove::connectors::{Connector, ConnectorError, InitialPointer};
use grove::runtime::CollectContext;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

/// How a scripted run ends after its batches are emitted.
#[derive(Clone, Debug)]
pub enum FinalAct {
    Succeed,
    FailTransient(String),
    FailPermanent(String),
}

/// Rendezvous used to hold a run open from the test body.
#[derive(Clone)]
pub struct Gate {
    /// Gains a permit when a run reaches the gate.
    pub started: Arc<Semaphore>,
    /// The run proceeds once the test adds a permit here.
    pub release: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            started: Arc::new(Semaphore::new(0)),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

/// A connector that replays a fixed script of (batch, pointer) pairs.
pub struct ScriptedConnector {
    name: &'static str,
    batches: Vec<(Vec<Value>, String)>,
    initial: InitialPointer,
    frequency: u64,
    final_act: FinalAct,
    gate: Option<Gate>,
    pub collects: Arc<AtomicUsize>,
    pub pointers_seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new(name: &'static str, batches: Vec<(Vec<Value>, String)>) -> Self {
        Self {
            name,
            batches,
            initial: InitialPointer::Literal("0".to_string()),
            frequency: 600,
            final_act: FinalAct::Succeed,
            gate: None,
            collects: Arc::new(AtomicUsize::new(0)),
            pointers_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_initial(mut self, initial: InitialPointer) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_final_act(mut self, act: FinalAct) -> Self {
        self.final_act = act;
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn collect_count(&self) -> usize {
        self.collects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_frequency(&self) -> u64 {
        self.frequency
    }

    fn initial_pointer(&self) -> InitialPointer {
        self.initial.clone()
    }

    async fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<(), ConnectorError> {
        self.collects.fetch_add(1, Ordering::SeqCst);
        self.pointers_seen.lock().push(ctx.pointer().to_string());

        if let Some(gate) = &self.gate {
            gate.started.add_permits(1);
            let permit = gate
                .release
                .acquire()
                .await
                .map_err(|_| ConnectorError::transient("gate closed"))?;
            permit.forget();
        }

        for (batch, pointer) in self.batches.clone() {
            ctx.emit(batch, pointer).await?;
        }

        match &self.final_act {
            FinalAct::Succeed => Ok(()),
            FinalAct::FailTransient(message) => Err(ConnectorError::transient(message.clone())),
            FinalAct::FailPermanent(message) => Err(ConnectorError::permanent(message.clone())),
        }
    }
}
