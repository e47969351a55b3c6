//! Skein Nodes - built-in executors for the Skein workflow engine
//!
//! One executor per node type (START, VARIABLE, MAPPER, DECISION, LOOP,
//! SCRIPT, SUB_FLOW, AI, NEXUS, and the SUCCESS/FAILURE terminals), plus
//! default implementations of the pluggable capabilities: a subprocess
//! script harness, an HTTP connector gateway, and an OpenAI-compatible
//! chat client.
//!
//! ```ignore
//! use skein_engine::{FlowEngine, FlowService};
//! use skein_nodes::builtin_registry;
//!
//! let engine = Arc::new(FlowEngine::new(builtin_registry()));
//! let service = FlowService::new(engine, flows, executions);
//! ```

pub mod ai;
pub mod connector;
pub mod decision;
pub mod harness;
pub mod llm;
pub mod loop_node;
pub mod mapper;
pub mod nexus;
pub mod script;
pub mod start;
pub mod subflow;
pub mod terminal;
pub mod variable;

use skein_engine::{ExecutorRegistry, NodeExecutor};

pub use ai::AiExecutor;
pub use connector::{Connector, ConnectorAuth, ConnectorKind, HttpConnectorGateway};
pub use decision::DecisionExecutor;
pub use harness::ProcessScriptHarness;
pub use llm::OpenAiCompatibleClient;
pub use loop_node::LoopExecutor;
pub use mapper::MapperExecutor;
pub use nexus::NexusExecutor;
pub use script::ScriptExecutor;
pub use start::StartExecutor;
pub use subflow::SubFlowExecutor;
pub use terminal::{FailureExecutor, SuccessExecutor};
pub use variable::VariableExecutor;

/// Every built-in executor, one per supported node type.
pub fn builtin_executors() -> Vec<Box<dyn NodeExecutor>> {
    vec![
        Box::new(StartExecutor),
        Box::new(VariableExecutor),
        Box::new(MapperExecutor),
        Box::new(DecisionExecutor),
        Box::new(LoopExecutor),
        Box::new(ScriptExecutor),
        Box::new(SubFlowExecutor),
        Box::new(AiExecutor),
        Box::new(NexusExecutor),
        Box::new(SuccessExecutor),
        Box::new(FailureExecutor),
    ]
}

/// A registry with every built-in executor registered.
pub fn builtin_registry() -> ExecutorRegistry {
    ExecutorRegistry::new(builtin_executors())
}
