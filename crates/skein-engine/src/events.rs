//! Execution event sink
//!
//! Events are pushed from the engine to live consumers (WebSocket bridges,
//! UIs, test collectors) as each node starts, retries, and completes.
//! Delivery is fire-and-forget: a sink must never block or fail the run.

use serde::{Deserialize, Serialize};

use crate::context::NodeStatus;
use crate::graph::JsonMap;

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
    /// A node started executing.
    #[serde(rename_all = "camelCase")]
    NodeStarted { execution_id: String, node_id: String },

    /// A node failed an attempt and is about to be retried.
    #[serde(rename_all = "camelCase")]
    NodeRetrying { execution_id: String, node_id: String },

    /// A node finished. Carries the current named-output snapshot so live
    /// consumers can render intermediate data.
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        status: NodeStatus,
        nex: JsonMap,
    },

    /// A node ended in failure with a diagnostic message.
    #[serde(rename_all = "camelCase")]
    NodeError {
        execution_id: String,
        node_id: String,
        message: String,
    },
}

/// Trait for receiving execution events.
///
/// Implementations must be non-blocking and swallow their own delivery
/// failures; the engine never inspects an outcome. All methods default to
/// no-ops so sinks can subscribe to a subset.
pub trait EventSink: Send + Sync {
    fn on_node_started(&self, execution_id: &str, node_id: &str) {
        let _ = (execution_id, node_id);
    }

    fn on_node_retrying(&self, execution_id: &str, node_id: &str) {
        let _ = (execution_id, node_id);
    }

    fn on_node_completed(&self, execution_id: &str, node_id: &str, status: NodeStatus, nex: &JsonMap) {
        let _ = (execution_id, node_id, status, nex);
    }

    fn on_node_error(&self, execution_id: &str, node_id: &str, message: &str) {
        let _ = (execution_id, node_id, message);
    }
}

/// A sink that discards all events. Useful for embedding and tests.
pub struct NullEventSink;

impl EventSink for NullEventSink {}

/// A sink that collects events into a vector, for asserting on event
/// sequences in tests.
#[derive(Default)]
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<ExecutionEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events, in order.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn push(&self, event: ExecutionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl EventSink for VecEventSink {
    fn on_node_started(&self, execution_id: &str, node_id: &str) {
        self.push(ExecutionEvent::NodeStarted {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
        });
    }

    fn on_node_retrying(&self, execution_id: &str, node_id: &str) {
        self.push(ExecutionEvent::NodeRetrying {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
        });
    }

    fn on_node_completed(&self, execution_id: &str, node_id: &str, status: NodeStatus, nex: &JsonMap) {
        self.push(ExecutionEvent::NodeCompleted {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            status,
            nex: nex.clone(),
        });
    }

    fn on_node_error(&self, execution_id: &str, node_id: &str, message: &str) {
        self.push(ExecutionEvent::NodeError {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink_collects_in_order() {
        let sink = VecEventSink::new();
        sink.on_node_started("exec-1", "n1");
        sink.on_node_completed("exec-1", "n1", NodeStatus::Success, &JsonMap::new());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ExecutionEvent::NodeStarted { .. }));
        match &events[1] {
            ExecutionEvent::NodeCompleted { node_id, status, .. } => {
                assert_eq!(node_id, "n1");
                assert_eq!(*status, NodeStatus::Success);
            }
            other => panic!("expected NodeCompleted, got {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization_is_camel_case() {
        let event = ExecutionEvent::NodeError {
            execution_id: "e".into(),
            node_id: "n".into(),
            message: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("type").unwrap(), "nodeError");
        assert_eq!(json.get("executionId").unwrap(), "e");
    }

    #[test]
    fn test_null_sink_is_silent() {
        let sink = NullEventSink;
        sink.on_node_started("e", "n");
        sink.on_node_error("e", "n", "ignored");
    }
}
