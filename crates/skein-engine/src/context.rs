//! Execution context data structures
//!
//! The mutable, per-run memory the engine threads through every step:
//! variables, node results, named outputs, loop state, and execution order.
//! One context is created per run, mutated throughout, and serialized to a
//! snapshot when the run ends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{JsonMap, NodeType};

/// Outcome of a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failure,
    /// LOOP node: keep looping, follow the CONTINUE edge.
    Continue,
    Skipped,
    Retrying,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Running => "RUNNING",
            NodeStatus::Success => "SUCCESS",
            NodeStatus::Failure => "FAILURE",
            NodeStatus::Continue => "CONTINUE",
            NodeStatus::Skipped => "SKIPPED",
            NodeStatus::Retrying => "RETRYING",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// The durable record of one node execution.
///
/// Branching nodes write to `success_output` or `failure_output`, never
/// both; non-branching nodes write to `output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_output: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_output: Option<JsonMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NodeRecord {
    pub fn new(node_id: impl Into<String>, node_type: NodeType, status: NodeStatus) -> Self {
        Self {
            node_id: node_id.into(),
            node_type,
            status,
            input: None,
            output: None,
            success_output: None,
            failure_output: None,
            error_message: None,
        }
    }

    /// A FAILURE record carrying `error` in both `failure_output` and
    /// `error_message`.
    pub fn failure(node_id: impl Into<String>, node_type: NodeType, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut failure_output = JsonMap::new();
        failure_output.insert("error".into(), Value::String(error.clone()));
        Self {
            failure_output: Some(failure_output),
            error_message: Some(error),
            ..Self::new(node_id, node_type, NodeStatus::Failure)
        }
    }

    pub fn with_input(mut self, input: JsonMap) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: JsonMap) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_success_output(mut self, output: JsonMap) -> Self {
        self.success_output = Some(output);
        self
    }

    pub fn with_failure_output(mut self, output: JsonMap) -> Self {
        self.failure_output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// The node's primary result: `success_output` when present, else
    /// `output`. This is what gets accumulated by loops and published to the
    /// named-output container.
    pub fn primary_output(&self) -> Option<&JsonMap> {
        self.success_output.as_ref().or(self.output.as_ref())
    }
}

/// Per-LOOP-node iteration bookkeeping, keyed by loop node id inside
/// [`RunMeta::loop_states`] so multiple LOOP nodes do not interfere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    /// Iterations completed so far.
    pub index: u32,
    /// Deep-copied outputs of the loop body, one entry per CONTINUE cycle.
    pub accumulated: Vec<Value>,
    pub max_iterations: u32,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            index: 0,
            accumulated: Vec::new(),
            max_iterations: 100,
        }
    }
}

/// Run metadata: identity, timing, status, and loop bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub flow_id: String,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Set when the run is stopped by loop detection, the step ceiling, or a
    /// structural node diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Per-LOOP-node state, keyed by loop node id.
    #[serde(default)]
    pub loop_states: HashMap<String, LoopState>,
    /// Set by the engine at run start: for each LOOP node id, whether it has
    /// at least one outgoing CONTINUE edge.
    #[serde(default)]
    pub loop_has_continue_edge: HashMap<String, bool>,
}

/// The full in-memory state of one run.
///
/// Exclusively owned by its run; executors receive it by mutable reference,
/// and only the final snapshot crosses the sub-flow boundary back to a
/// parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub meta: RunMeta,

    /// Flat variable map written by VARIABLE nodes. Values that look numeric
    /// are stored as numbers so expression arithmetic works.
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    /// Durable node-id → result map; this is what gets persisted. Key order
    /// is not meaningful; `node_execution_order` is the authoritative
    /// sequence.
    #[serde(default)]
    pub nodes: HashMap<String, NodeRecord>,

    /// Label-derived alias → result map for human-friendly reference paths
    /// within the run. Never persisted.
    #[serde(skip)]
    pub node_aliases: HashMap<String, NodeRecord>,

    /// Flat name → value container populated by "save output as" nodes; the
    /// universal side-channel for cross-node and cross-sub-flow data. Keys
    /// are case-sensitive.
    #[serde(default)]
    pub nex: JsonMap,

    /// Node ids in the sequence actually executed.
    #[serde(default)]
    pub node_execution_order: Vec<String>,
}

impl FlowContext {
    /// Create a fresh context for a run, status RUNNING.
    pub fn create(flow_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            meta: RunMeta {
                flow_id: flow_id.into(),
                execution_id: execution_id.into(),
                current_node_id: None,
                started_at: Utc::now(),
                completed_at: None,
                status: RunStatus::Running,
                error_message: None,
                loop_states: HashMap::new(),
                loop_has_continue_edge: HashMap::new(),
            },
            variables: HashMap::new(),
            nodes: HashMap::new(),
            node_aliases: HashMap::new(),
            nex: JsonMap::new(),
            node_execution_order: Vec::new(),
        }
    }

    /// Store a result by node id. Only this map is persisted.
    pub fn record_node(&mut self, node_id: impl Into<String>, record: NodeRecord) {
        self.nodes.insert(node_id.into(), record);
    }

    /// Store a result under its label alias. In-memory only.
    pub fn record_alias(&mut self, alias: impl Into<String>, record: NodeRecord) {
        self.node_aliases.insert(alias.into(), record);
    }

    /// Resolve a result by node id first, then by label alias.
    pub fn node_record(&self, key: &str) -> Option<&NodeRecord> {
        self.nodes.get(key).or_else(|| self.node_aliases.get(key))
    }

    /// The START node's record, wherever it was stored.
    pub fn start_record(&self) -> Option<&NodeRecord> {
        self.nodes.values().find(|r| r.node_type == NodeType::Start)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Merged id + alias view of node results for script input, so both
    /// `input.nodes.<uuid>` and `input.nodes.calculateDiscount` work.
    pub fn script_input_nodes(&self) -> JsonMap {
        let mut merged = JsonMap::new();
        for (key, record) in self.nodes.iter().chain(self.node_aliases.iter()) {
            if let Ok(value) = serde_json::to_value(record) {
                merged.insert(key.clone(), value);
            }
        }
        merged
    }

    /// The persisted snapshot: `{meta, variables, nodes, nex,
    /// nodeExecutionOrder}`. Aliases are excluded.
    pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(id: &str, node_type: NodeType) -> NodeRecord {
        let mut output = JsonMap::new();
        output.insert("x".into(), json!(1));
        NodeRecord::new(id, node_type, NodeStatus::Success).with_output(output)
    }

    #[test]
    fn test_node_record_failure_helper() {
        let record = NodeRecord::failure("n1", NodeType::Script, "boom");
        assert_eq!(record.status, NodeStatus::Failure);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert_eq!(record.failure_output.unwrap().get("error"), Some(&json!("boom")));
    }

    #[test]
    fn test_primary_output_prefers_success_output() {
        let mut success = JsonMap::new();
        success.insert("a".into(), json!(1));
        let mut output = JsonMap::new();
        output.insert("b".into(), json!(2));

        let record = NodeRecord::new("n1", NodeType::Loop, NodeStatus::Success)
            .with_success_output(success)
            .with_output(output);

        assert!(record.primary_output().unwrap().contains_key("a"));
    }

    #[test]
    fn test_record_lookup_by_id_then_alias() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.record_node("uuid-1", sample_record("uuid-1", NodeType::Mapper));
        ctx.record_alias("calculateDiscount", sample_record("uuid-1", NodeType::Mapper));

        assert!(ctx.node_record("uuid-1").is_some());
        assert!(ctx.node_record("calculateDiscount").is_some());
        assert!(ctx.node_record("other").is_none());
    }

    #[test]
    fn test_start_record_found_by_type() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.record_node("abc", sample_record("abc", NodeType::Start));
        assert_eq!(ctx.start_record().unwrap().node_id, "abc");
    }

    #[test]
    fn test_snapshot_excludes_aliases() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.record_node("n1", sample_record("n1", NodeType::Mapper));
        ctx.record_alias("myNode", sample_record("n1", NodeType::Mapper));
        ctx.node_execution_order.push("n1".into());

        let snapshot = ctx.snapshot().unwrap();
        assert!(snapshot.get("nodes").unwrap().get("n1").is_some());
        assert!(snapshot.get("nodeAliases").is_none());
        assert_eq!(snapshot.get("nodeExecutionOrder").unwrap(), &json!(["n1"]));
    }

    #[test]
    fn test_node_record_skips_absent_outputs() {
        let record = NodeRecord::new("n1", NodeType::Start, NodeStatus::Success);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("output").is_none());
        assert!(value.get("errorMessage").is_none());
        assert_eq!(value.get("status").unwrap(), &json!("SUCCESS"));
    }
}
