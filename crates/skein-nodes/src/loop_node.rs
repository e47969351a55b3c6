//! LOOP node
//!
//! Evaluates its condition (with `{{loop.index}}` and `{{loop.accumulated}}`
//! available) and returns CONTINUE to re-enter the loop body or SUCCESS to
//! exit. The body's output is captured into the loop state once per
//! CONTINUE cycle. A LOOP node without an explicit CONTINUE back-edge fails
//! immediately, and every failure here is structural: it stops the run and
//! is never retried.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus,
    NodeType, RunServices,
};

static NEX_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const MAX_ITERATIONS_CEILING: u32 = 1000;
const DEFAULT_MAX_ITERATIONS: u32 = 100;

pub struct LoopExecutor;

#[async_trait]
impl NodeExecutor for LoopExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Loop
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let label = node.label.as_deref().unwrap_or(&node.id).to_string();

        // The engine records CONTINUE-edge presence at run start.
        let has_continue = ctx
            .meta
            .loop_has_continue_edge
            .get(&node.id)
            .copied()
            .unwrap_or(false);
        if !has_continue {
            return Ok(structural_failure(
                ctx,
                &node.id,
                format!(
                    "LOOP node '{label}' has no CONTINUE edge. Draw an edge from the CONTINUE handle back to the loop body."
                ),
            ));
        }

        let condition = node.config_str("condition").unwrap_or("false").to_string();
        let max_iterations = node
            .config
            .get("maxIterations")
            .and_then(|v| v.as_u64())
            .map(|n| (n as u32).clamp(1, MAX_ITERATIONS_CEILING))
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        let mut state = ctx.meta.loop_states.remove(&node.id).unwrap_or_default();
        state.max_iterations = max_iterations;

        if state.index >= state.max_iterations {
            ctx.meta.loop_states.insert(node.id.clone(), state);
            return Ok(structural_failure(
                ctx,
                &node.id,
                format!(
                    "Loop exceeded max iterations ({max_iterations}) at node '{label}'. Increase max or fix the exit condition."
                ),
            ));
        }

        // Capture the previous cycle's output: the node executed immediately
        // before this visit, skipped on the first visit (no completed cycle
        // yet) and when the loop routed straight back to itself.
        if state.index > 0 {
            if let Some(last_id) = ctx.node_execution_order.last() {
                if last_id != &node.id {
                    if let Some(output) = ctx
                        .node_record(last_id)
                        .and_then(NodeRecord::primary_output)
                    {
                        state.accumulated.push(Value::Object(output.clone()));
                    }
                }
            }
        }

        let resolved = resolver::resolve_with_loop(&condition, ctx, Some(&state));
        let continue_looping = evaluate_condition(&resolved);

        if continue_looping {
            state.index += 1;
            let mut output = JsonMap::new();
            output.insert("index".into(), Value::from(state.index));
            output.insert("continuing".into(), Value::Bool(true));
            ctx.meta.loop_states.insert(node.id.clone(), state);

            return Ok(
                NodeRecord::new(&node.id, NodeType::Loop, NodeStatus::Continue).with_output(output)
            );
        }

        let mut success_output = JsonMap::new();
        success_output.insert("index".into(), Value::from(state.index));
        success_output.insert("accumulated".into(), Value::Array(state.accumulated.clone()));
        success_output.insert("iterationCount".into(), Value::from(state.index + 1));

        // This node publishes its own summary; the engine's save-output-as
        // pass skips LOOP nodes.
        if let Some(name) = node.save_output_as() {
            if NEX_KEY.is_match(name) {
                ctx.nex
                    .insert(name.to_string(), Value::Object(success_output.clone()));
            }
        }

        ctx.meta.loop_states.insert(node.id.clone(), state);

        Ok(NodeRecord::new(&node.id, NodeType::Loop, NodeStatus::Success)
            .with_success_output(success_output.clone())
            .with_output(success_output))
    }
}

/// A structural loop failure also lands in the run's diagnostic, so the run
/// ends FAILURE even when a failure edge routes onward.
fn structural_failure(ctx: &mut FlowContext, node_id: &str, message: String) -> NodeRecord {
    ctx.meta.error_message = Some(message.clone());
    NodeRecord::failure(node_id, NodeType::Loop, message)
}

/// Parse a resolved condition string: `left op right` with op one of
/// `== != <= >= < >`. Without an operator the string is parsed as a bare
/// boolean.
fn evaluate_condition(condition: &str) -> bool {
    let condition = condition.trim();
    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some(idx) = condition.find(op) {
            let left = condition[..idx].trim();
            let right = condition[idx + op.len()..].trim();
            return compare(left, right, op);
        }
    }
    condition.eq_ignore_ascii_case("true")
}

/// Numeric comparison when both sides parse, then boolean when the left
/// side is a boolean literal, then lexicographic string comparison.
fn compare(left: &str, right: &str, op: &str) -> bool {
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<" => l < r,
            ">" => l > r,
            "<=" => l <= r,
            ">=" => l >= r,
            _ => false,
        };
    }
    if left.eq_ignore_ascii_case("true") || left.eq_ignore_ascii_case("false") {
        let l = left.eq_ignore_ascii_case("true");
        let r = right.eq_ignore_ascii_case("true");
        return match op {
            "==" => l == r,
            "!=" => l != r,
            _ => false,
        };
    }
    match op {
        "==" => left == right,
        "!=" => left != right,
        "<" => left < right,
        ">" => left > right,
        "<=" => left <= right,
        ">=" => left >= right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loop_node(condition: &str) -> FlowNode {
        let mut node = FlowNode::new("loop1", NodeType::Loop);
        node.config.insert("condition".into(), json!(condition));
        node
    }

    fn ctx_with_continue_edge() -> FlowContext {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.meta.loop_has_continue_edge.insert("loop1".into(), true);
        ctx
    }

    #[test]
    fn test_condition_grammar() {
        assert!(evaluate_condition("0 < 3"));
        assert!(!evaluate_condition("3 < 3"));
        assert!(evaluate_condition("3 <= 3"));
        assert!(evaluate_condition("a != b"));
        assert!(evaluate_condition("true == true"));
        assert!(!evaluate_condition("true != true"));
        assert!(evaluate_condition("true"));
        assert!(!evaluate_condition("nonsense"));
        assert!(evaluate_condition("apple < banana"));
    }

    #[tokio::test]
    async fn test_missing_continue_edge_is_structural_failure() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = loop_node("{{loop.index}} < 3");

        let services = RunServices::unconfigured();
        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
        assert!(ctx.meta.error_message.unwrap().contains("no CONTINUE edge"));
    }

    #[tokio::test]
    async fn test_continue_until_condition_false() {
        let mut ctx = ctx_with_continue_edge();
        let node = loop_node("{{loop.index}} < 2");
        let services = RunServices::unconfigured();

        let first = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(first.status, NodeStatus::Continue);
        assert_eq!(ctx.meta.loop_states.get("loop1").unwrap().index, 1);

        let second = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(second.status, NodeStatus::Continue);

        let third = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(third.status, NodeStatus::Success);
        let output = third.success_output.unwrap();
        assert_eq!(output.get("index"), Some(&json!(2)));
        assert_eq!(output.get("iterationCount"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_max_iterations_exceeded() {
        let mut ctx = ctx_with_continue_edge();
        let mut node = loop_node("true");
        node.config.insert("maxIterations".into(), json!(2));
        let services = RunServices::unconfigured();

        assert_eq!(
            LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap().status,
            NodeStatus::Continue
        );
        assert_eq!(
            LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap().status,
            NodeStatus::Continue
        );

        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Failure);
        assert!(ctx.meta.error_message.unwrap().contains("max iterations"));
    }

    #[tokio::test]
    async fn test_accumulates_previous_node_output_per_cycle() {
        let mut ctx = ctx_with_continue_edge();
        let node = loop_node("{{loop.index}} < 2");
        let services = RunServices::unconfigured();

        // Entry pass: body ran once before the loop, nothing accumulated yet.
        ctx.record_node(
            "body",
            NodeRecord::new("body", NodeType::Mapper, NodeStatus::Success)
                .with_output(json!({ "v": 0 }).as_object().unwrap().clone()),
        );
        ctx.node_execution_order.push("body".into());
        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Continue);
        assert!(ctx.meta.loop_states.get("loop1").unwrap().accumulated.is_empty());
        ctx.node_execution_order.push("loop1".into());

        // First re-entry: the body's fresh output gets captured.
        ctx.record_node(
            "body",
            NodeRecord::new("body", NodeType::Mapper, NodeStatus::Success)
                .with_output(json!({ "v": 1 }).as_object().unwrap().clone()),
        );
        ctx.node_execution_order.push("body".into());
        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Continue);
        ctx.node_execution_order.push("loop1".into());

        ctx.record_node(
            "body",
            NodeRecord::new("body", NodeType::Mapper, NodeStatus::Success)
                .with_output(json!({ "v": 2 }).as_object().unwrap().clone()),
        );
        ctx.node_execution_order.push("body".into());
        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Success);
        let output = record.success_output.unwrap();
        assert_eq!(
            output.get("accumulated"),
            Some(&json!([{ "v": 1 }, { "v": 2 }]))
        );
    }

    #[tokio::test]
    async fn test_save_output_as_writes_nex() {
        let mut ctx = ctx_with_continue_edge();
        let mut node = loop_node("false");
        node.config.insert("saveOutputAs".into(), json!("myLoop"));
        let services = RunServices::unconfigured();

        let record = LoopExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Success);
        assert!(ctx.nex.get("myLoop").unwrap().get("accumulated").is_some());
    }
}
