//! Flow graph model
//!
//! Defines the stored workflow graph consumed read-only by each run:
//! typed nodes, conditional edges, and lookup helpers.

use serde::{Deserialize, Serialize};

/// Untyped key→value configuration map, semantics defined per node type.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The closed set of node types the engine understands.
///
/// `Delay` and `Transform` are declared for forward compatibility but have
/// no registered executor; a graph using them fails at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Start,
    /// Outbound HTTP/JDBC call through a saved connector.
    Nexus,
    /// Invokes another flow, synchronously or fire-and-forget.
    SubFlow,
    /// User-written JavaScript or Python.
    Script,
    Variable,
    Mapper,
    Decision,
    Loop,
    /// Language-model call; returns JSON.
    Ai,
    Success,
    Failure,

    // Future nodes
    Delay,
    Transform,
}

impl NodeType {
    /// SUCCESS and FAILURE nodes end the run when executed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeType::Success | NodeType::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "START",
            NodeType::Nexus => "NEXUS",
            NodeType::SubFlow => "SUB_FLOW",
            NodeType::Script => "SCRIPT",
            NodeType::Variable => "VARIABLE",
            NodeType::Mapper => "MAPPER",
            NodeType::Decision => "DECISION",
            NodeType::Loop => "LOOP",
            NodeType::Ai => "AI",
            NodeType::Success => "SUCCESS",
            NodeType::Failure => "FAILURE",
            NodeType::Delay => "DELAY",
            NodeType::Transform => "TRANSFORM",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which prior-node outcome permits following an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeCondition {
    /// Follow when the source node succeeds.
    Success,
    /// Follow when the source node fails.
    Failure,
    /// Used by LOOP nodes to route back into the loop body.
    Continue,
    /// Always follow (for non-branching nodes).
    Default,
    /// Follow based on a custom expression. The expression is carried on the
    /// edge but not evaluated; a CUSTOM edge is never eligible.
    Custom,
}

/// A typed unit of work in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Unique node id within the flow.
    pub id: String,
    pub node_type: NodeType,
    /// Human-readable label shown in the editor; also the source of the
    /// node's alias key for reference resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Node-specific configuration.
    #[serde(default)]
    pub config: JsonMap,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: None,
            config: JsonMap::new(),
        }
    }

    /// Default START node synthesized when a flow has none.
    pub fn synthetic_start() -> Self {
        Self::new("start", NodeType::Start)
    }

    /// Get a string-valued config entry.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// The "save output as" name configured on this node, if any.
    pub fn save_output_as(&self) -> Option<&str> {
        self.config_str("saveOutputAs").map(str::trim).filter(|s| !s.is_empty())
    }

    /// Label-derived alias key, e.g. "Calculate Discount" → `calculateDiscount`.
    pub fn alias_key(&self) -> Option<String> {
        self.label.as_deref().and_then(alias_from_label)
    }
}

/// An edge connecting two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source_node_id: String,
    pub target_node_id: String,
    pub condition: EdgeCondition,
    /// Reserved for CUSTOM edges; carried through, currently inert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expr: Option<String>,
}

impl FlowEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            condition,
            condition_expr: None,
        }
    }
}

/// Complete stored workflow graph, read-only during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraph {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by id.
    pub fn find_node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The flow's START node, if one is present.
    pub fn start_node(&self) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.node_type == NodeType::Start)
    }

    /// All edges leaving a node.
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.source_node_id == node_id)
    }

    /// Whether the node has at least one outgoing CONTINUE edge.
    pub fn has_continue_edge(&self, node_id: &str) -> bool {
        self.outgoing_edges(node_id)
            .any(|e| e.condition == EdgeCondition::Continue)
    }
}

/// Derive a lowerCamelCase alias key from a node label.
///
/// Splits on non-alphanumeric characters; the first word is lowercased, the
/// remaining words get an uppercased first letter. Returns `None` when the
/// label holds no alphanumeric characters.
pub fn alias_from_label(label: &str) -> Option<String> {
    let mut words = label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty());

    let first = words.next()?;
    let mut alias = first.to_ascii_lowercase();
    for word in words {
        let mut chars = word.chars();
        if let Some(c) = chars.next() {
            alias.push(c.to_ascii_uppercase());
            alias.extend(chars);
        }
    }
    Some(alias)
}
