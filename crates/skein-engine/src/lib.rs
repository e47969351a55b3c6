//! Skein Engine - graph-based workflow execution
//!
//! A stored directed graph of typed nodes and conditional edges is
//! interpreted at trigger time to produce a deterministic, auditable run.
//! This crate holds the core: the execution engine that walks the graph,
//! the per-node retry/backoff wrapper, the node-type dispatch contract, the
//! `{{...}}` reference-resolution language used throughout node
//! configuration, and the execution-context structures (variables, named
//! outputs, loop state, execution order) that give the interpreter memory
//! across steps.
//!
//! # Architecture
//!
//! - [`FlowEngine`]: the interpreter loop; one node at a time, FIFO
//!   successor queue, cycle detection, step ceiling
//! - [`resolver`]: dotted-path lookup plus four binary operators over the
//!   run's context
//! - [`NodeExecutor`] + [`ExecutorRegistry`]: one executor per node type,
//!   registered once before any run
//! - [`FlowService`]: the trigger boundary; background vs. synchronous
//!   runs, snapshot persistence, and the recursion entry for sub-flows
//!
//! Executor implementations for the built-in node types live in the
//! `skein-nodes` crate.

pub mod capability;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod store;

// Re-export key types
pub use capability::{
    ConnectorGateway, ConnectorRequest, ConnectorResponse, LanguageModel, LlmRequest, LlmResponse,
    ScriptHarness, ScriptOutcome,
};
pub use context::{FlowContext, LoopState, NodeRecord, NodeStatus, RunMeta, RunStatus};
pub use engine::{EngineConfig, FlowEngine};
pub use error::{EngineError, NodeError};
pub use events::{EventSink, ExecutionEvent, NullEventSink, VecEventSink};
pub use executor::{NodeExecutor, RunServices};
pub use graph::{EdgeCondition, FlowEdge, FlowGraph, FlowNode, JsonMap, NodeType};
pub use registry::ExecutorRegistry;
pub use retry::RetryConfig;
pub use service::{FlowService, FlowTrigger};
pub use store::{Execution, ExecutionStore, FlowStore, InMemoryExecutionStore, InMemoryFlowStore};
