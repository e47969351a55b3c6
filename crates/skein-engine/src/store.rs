//! Flow and execution storage
//!
//! Narrow persistence contracts the trigger boundary depends on, with
//! in-memory implementations for tests and embedding. Real deployments put
//! a database behind these traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::context::RunStatus;
use crate::graph::FlowGraph;

/// One interpretation of a flow for one trigger payload.
///
/// Created RUNNING when the trigger accepts the request; status and the
/// final context snapshot are filled in when the run completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub flow_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque structured snapshot of the final execution context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
}

impl Execution {
    pub fn new(flow_id: impl Into<String>, triggered_by: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            status: RunStatus::Running,
            triggered_by: Some(triggered_by.into()),
            started_at: Utc::now(),
            completed_at: None,
            snapshot: None,
        }
    }
}

/// Read access to stored flow graphs.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn get_flow(&self, flow_id: &str) -> Option<FlowGraph>;
}

/// Persistence for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save(&self, execution: Execution);
    async fn get(&self, execution_id: &str) -> Option<Execution>;
}

/// Map-backed flow store.
#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<String, FlowGraph>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, graph: FlowGraph) {
        self.flows.write().await.insert(graph.id.clone(), graph);
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get_flow(&self, flow_id: &str) -> Option<FlowGraph> {
        self.flows.read().await.get(flow_id).cloned()
    }
}

/// Map-backed execution store.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<String, Execution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of executions recorded so far.
    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }

    /// All recorded executions, unordered.
    pub async fn all(&self) -> Vec<Execution> {
        self.executions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: Execution) {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution);
    }

    async fn get(&self, execution_id: &str) -> Option<Execution> {
        self.executions.read().await.get(execution_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_flow_store_roundtrip() {
        let store = InMemoryFlowStore::new();
        store.insert(FlowGraph::new("f1", "Test")).await;

        assert!(store.get_flow("f1").await.is_some());
        assert!(store.get_flow("f2").await.is_none());
    }

    #[tokio::test]
    async fn test_execution_store_updates_in_place() {
        let store = InMemoryExecutionStore::new();
        let mut execution = Execution::new("f1", "API");
        let id = execution.id.clone();
        store.save(execution.clone()).await;

        execution.status = RunStatus::Success;
        execution.completed_at = Some(Utc::now());
        store.save(execution).await;

        assert_eq!(store.len().await, 1);
        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let a = Execution::new("f1", "API");
        let b = Execution::new("f1", "API");
        assert_ne!(a.id, b.id);
    }
}
