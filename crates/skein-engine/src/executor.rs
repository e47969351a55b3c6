//! Node executor contract
//!
//! One executor per node type. Each reads the execution context and a
//! node's static configuration and returns a typed result; the engine owns
//! recording, eventing, and routing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{ConnectorGateway, LanguageModel, ScriptHarness};
use crate::capability::{UnconfiguredConnectorGateway, UnconfiguredLanguageModel, UnconfiguredScriptHarness};
use crate::context::{FlowContext, NodeRecord};
use crate::error::NodeError;
use crate::events::{EventSink, NullEventSink};
use crate::graph::{FlowNode, NodeType};
use crate::service::FlowTrigger;
use crate::store::{FlowStore, InMemoryFlowStore};

/// Collaborators threaded into every node execution.
///
/// Built once per run by the trigger boundary and passed by shared
/// reference; executors that recurse into child flows go through `trigger`.
#[derive(Clone)]
pub struct RunServices {
    pub events: Arc<dyn EventSink>,
    pub scripts: Arc<dyn ScriptHarness>,
    pub language_model: Arc<dyn LanguageModel>,
    pub connectors: Arc<dyn ConnectorGateway>,
    pub flows: Arc<dyn FlowStore>,
    /// Handle back into the trigger boundary for SUB_FLOW recursion; absent
    /// when the engine is driven without one (sub-flow nodes then fail).
    pub trigger: Option<Arc<dyn FlowTrigger>>,
}

impl RunServices {
    /// Services with every capability stubbed out. Pure data flows
    /// (variables, mappers, decisions, loops, terminals) run fine on this.
    pub fn unconfigured() -> Self {
        Self {
            events: Arc::new(NullEventSink),
            scripts: Arc::new(UnconfiguredScriptHarness),
            language_model: Arc::new(UnconfiguredLanguageModel),
            connectors: Arc::new(UnconfiguredConnectorGateway),
            flows: Arc::new(InMemoryFlowStore::new()),
            trigger: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

/// The contract every node type implements.
///
/// Implementations are pure with respect to their inputs except where they
/// intentionally mutate the context: VARIABLE writes `variables`, LOOP
/// writes its own loop state and named-output summary. Everything else the
/// engine applies from the returned record.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The node type this executor handles.
    fn supported_type(&self) -> NodeType;

    /// Execute the node against the current context.
    ///
    /// Returning `Err` is a node-level fault; the engine's retry wrapper
    /// converts it into a FAILURE record; it never aborts the run.
    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError>;
}
