//! Executor registry
//!
//! An immutable node-type → executor lookup table, built once before any
//! run begins. A graph referencing an unregistered type is a reportable
//! configuration error, never a silent no-op.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::executor::NodeExecutor;
use crate::graph::NodeType;

pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Box<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Build the registry from a set of executors. A later executor for the
    /// same type replaces the earlier one, with a warning.
    pub fn new(executors: Vec<Box<dyn NodeExecutor>>) -> Self {
        let mut map: HashMap<NodeType, Box<dyn NodeExecutor>> = HashMap::new();
        for executor in executors {
            let node_type = executor.supported_type();
            if map.insert(node_type, executor).is_some() {
                log::warn!("Duplicate executor registered for node type {node_type}; keeping the last one");
            }
        }
        Self { executors: map }
    }

    /// Look up the executor for a node type.
    pub fn get(&self, node_type: NodeType) -> Result<&dyn NodeExecutor, EngineError> {
        self.executors
            .get(&node_type)
            .map(|e| e.as_ref())
            .ok_or(EngineError::UnsupportedNodeType(node_type))
    }

    pub fn is_supported(&self, node_type: NodeType) -> bool {
        self.executors.contains_key(&node_type)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
