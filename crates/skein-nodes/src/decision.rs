//! DECISION node
//!
//! Branching-by-status: the engine routes the SUCCESS edge when the
//! decision evaluates true and the FAILURE edge when it evaluates false.
//! A false decision is control flow, not an error.
//!
//! Simple mode:
//!
//! ```json
//! {
//!   "left":     "{{variables.amount}}",
//!   "operator": "GT",
//!   "right":    "500"
//! }
//! ```
//!
//! Code mode (`"mode": "code"`) runs user code through the script harness
//! and coerces its return value to a boolean.

use async_trait::async_trait;
use serde_json::Value;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus,
    NodeType, RunServices, ScriptOutcome,
};

use crate::script::build_script_input;

pub struct DecisionExecutor;

#[async_trait]
impl NodeExecutor for DecisionExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Decision
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let mode = node.config_str("mode").unwrap_or("simple");
        if mode.eq_ignore_ascii_case("code") {
            return Ok(self.execute_code_mode(node, ctx, services).await);
        }
        Ok(self.execute_simple_mode(node, ctx))
    }
}

impl DecisionExecutor {
    fn execute_simple_mode(&self, node: &FlowNode, ctx: &FlowContext) -> NodeRecord {
        let Some(operator) = node.config_str("operator").map(str::to_string) else {
            return NodeRecord::failure(&node.id, NodeType::Decision, "DECISION node has no operator configured");
        };
        let left = resolver::resolve(node.config_str("left").unwrap_or_default(), ctx);
        let right = resolver::resolve(node.config_str("right").unwrap_or_default(), ctx);

        let result = evaluate(&left, &operator, &right);

        let mut output = JsonMap::new();
        output.insert("result".into(), Value::Bool(result));
        output.insert("left".into(), Value::String(left));
        output.insert("operator".into(), Value::String(operator));
        output.insert("right".into(), Value::String(right));

        let status = if result { NodeStatus::Success } else { NodeStatus::Failure };
        NodeRecord::new(&node.id, NodeType::Decision, status).with_output(output)
    }

    async fn execute_code_mode(
        &self,
        node: &FlowNode,
        ctx: &FlowContext,
        services: &RunServices,
    ) -> NodeRecord {
        let language = node.config_str("language").unwrap_or("javascript");
        let code = node.config_str("code").unwrap_or_default();
        if code.trim().is_empty() {
            return NodeRecord::failure(&node.id, NodeType::Decision, "DECISION node in code mode has no code configured");
        }

        let input = build_script_input(ctx);
        match services.scripts.run(language, code, &input).await {
            ScriptOutcome::Completed(value) => {
                let result = truthy(&value);
                let mut output = JsonMap::new();
                output.insert("result".into(), Value::Bool(result));
                output.insert("mode".into(), Value::String("code".into()));
                output.insert("returned".into(), value);

                let status = if result { NodeStatus::Success } else { NodeStatus::Failure };
                NodeRecord::new(&node.id, NodeType::Decision, status).with_output(output)
            }
            ScriptOutcome::Failed(error) => {
                NodeRecord::failure(&node.id, NodeType::Decision, format!("Decision code failed: {error}"))
            }
        }
    }
}

/// Numeric comparison when both sides parse as numbers, else string
/// comparison for EQ/NEQ/CONTAINS. Unknown operators evaluate false.
fn evaluate(left: &str, operator: &str, right: &str) -> bool {
    if let (Ok(l), Ok(r)) = (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        return match operator.to_ascii_uppercase().as_str() {
            "GT" => l > r,
            "LT" => l < r,
            "GTE" => l >= r,
            "LTE" => l <= r,
            "EQ" => l == r,
            "NEQ" => l != r,
            _ => false,
        };
    }
    match operator.to_ascii_uppercase().as_str() {
        "EQ" => left == right,
        "NEQ" => left != right,
        "CONTAINS" => left.contains(right),
        _ => false,
    }
}

/// Truthiness for code-mode results: null, blank, and "false" are false;
/// numbers are true when nonzero; any other non-null value is true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("false")
        }
        _ => true,
    }
}
