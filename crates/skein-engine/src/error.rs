//! Error types for the workflow engine

use thiserror::Error;

use crate::graph::NodeType;

/// Fatal engine faults.
///
/// Normal flow failures (node failures, cycles, step overflow) never surface
/// here; they are encoded in the returned context's status. These variants
/// indicate the deployed engine or its wiring cannot run the graph at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph references a node type with no registered executor. A
    /// programming/configuration error in the graph definition itself.
    #[error("No executor registered for node type: {0}")]
    UnsupportedNodeType(NodeType),

    /// The trigger boundary was asked to run an unknown flow.
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// Snapshot serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Node-level faults raised by executors.
///
/// The retry wrapper converts these into FAILURE node results; they never
/// escape to the engine loop.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Missing or invalid node configuration.
    #[error("{0}")]
    InvalidConfig(String),

    /// The node's work itself failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// A pluggable capability (script, model, connector) failed.
    #[error("{0}")]
    Capability(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Create an execution failed error with a message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create an invalid-configuration error with a message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
