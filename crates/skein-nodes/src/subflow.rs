//! SUB_FLOW node
//!
//! Invokes another flow.
//!
//! ```json
//! {
//!   "targetFlowId":   "flow-id",
//!   "targetFlowName": "My Child Flow",
//!   "mode":           "SYNC",
//!   "payload":        { "userId": "{{variables.userId}}" }
//! }
//! ```
//!
//! SYNC blocks until the child run completes; the child's full final
//! context snapshot lands under `successOutput.nco`, and a convenience
//! `result` field surfaces the last `successOutput.result` the child
//! produced. A failed child routes this node's FAILURE edge.
//!
//! ASYNC fires the child run on a background task and returns SUCCESS
//! immediately; the parent never observes the child's outcome.
//!
//! A flow cannot call itself; only the direct self-call is rejected, an
//! indirect cycle (A calls B calls A) is not detected.

use async_trait::async_trait;
use serde_json::Value;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus,
    NodeType, RunServices, RunStatus,
};

pub struct SubFlowExecutor;

#[async_trait]
impl NodeExecutor for SubFlowExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::SubFlow
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let Some(target_flow_id) = node.config_str("targetFlowId").map(str::to_string) else {
            return Ok(failure(node, None, "SUB_FLOW node has no targetFlowId configured"));
        };
        if target_flow_id.trim().is_empty() {
            return Ok(failure(node, None, "SUB_FLOW node has no targetFlowId configured"));
        }

        let Some(target_flow) = services.flows.get_flow(&target_flow_id).await else {
            return Ok(failure(node, None, format!("Target flow not found: {target_flow_id}")));
        };

        if target_flow_id == ctx.meta.flow_id {
            return Ok(failure(
                node,
                None,
                "Circular reference: flow cannot call itself. Use a different target flow.",
            ));
        }

        let Some(trigger) = services.trigger.as_deref() else {
            return Ok(failure(node, None, "No trigger boundary is configured for sub-flows"));
        };

        let mode = node
            .config_str("mode")
            .unwrap_or("SYNC")
            .to_ascii_uppercase();

        let raw_payload = node
            .config
            .get("payload")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let mut payload = resolver::resolve_map(&raw_payload, ctx);

        // With no payload configured, pass the parent's trigger body so the
        // child still receives meaningful input.
        if payload.is_empty() {
            if let Some(body) = ctx
                .start_record()
                .and_then(|r| r.output.as_ref())
                .and_then(|o| o.get("body"))
                .and_then(|b| b.as_object())
            {
                payload = body.clone();
                log::info!(
                    "SUB_FLOW {}: empty payload config, passing parent trigger body to child",
                    node.id
                );
            }
        }

        let mut input_snapshot = JsonMap::new();
        input_snapshot.insert("targetFlowId".into(), Value::String(target_flow_id.clone()));
        input_snapshot.insert("targetFlowName".into(), Value::String(target_flow.name.clone()));
        input_snapshot.insert("mode".into(), Value::String(mode.clone()));
        input_snapshot.insert("payload".into(), Value::Object(payload.clone()));

        let triggered_by = format!("SUB_FLOW:{}", ctx.meta.execution_id);

        if mode == "ASYNC" {
            if let Err(err) = trigger.trigger_flow(&target_flow_id, payload, &triggered_by).await {
                return Ok(failure(
                    node,
                    Some(input_snapshot),
                    format!("Child flow trigger failed: {err}"),
                ));
            }

            let mut success_output = JsonMap::new();
            success_output.insert("status".into(), Value::String("TRIGGERED".into()));
            success_output.insert("mode".into(), Value::String("ASYNC".into()));
            success_output.insert("targetFlowId".into(), Value::String(target_flow_id));
            success_output.insert("targetFlowName".into(), Value::String(target_flow.name));

            return Ok(NodeRecord::new(&node.id, NodeType::SubFlow, NodeStatus::Success)
                .with_input(input_snapshot)
                .with_success_output(success_output));
        }

        match trigger.trigger_flow_sync(&target_flow_id, payload, &triggered_by).await {
            Ok(child) => {
                let child_succeeded = child.status == RunStatus::Success;
                let snapshot = child.snapshot.unwrap_or(Value::Null);

                let mut output = JsonMap::new();
                output.insert("executionId".into(), Value::String(child.id));
                output.insert("status".into(), Value::String(child.status.to_string()));
                output.insert("mode".into(), Value::String("SYNC".into()));
                output.insert("targetFlowId".into(), Value::String(target_flow_id));
                output.insert("targetFlowName".into(), Value::String(target_flow.name));
                output.insert("result".into(), extract_child_result(&snapshot));
                output.insert("nco".into(), snapshot);

                let record = NodeRecord::new(
                    &node.id,
                    NodeType::SubFlow,
                    if child_succeeded { NodeStatus::Success } else { NodeStatus::Failure },
                )
                .with_input(input_snapshot);

                if child_succeeded {
                    Ok(record.with_success_output(output))
                } else {
                    let status = child.status;
                    Ok(record
                        .with_failure_output(output)
                        .with_error(format!("Child flow ended with status: {status}")))
                }
            }
            Err(err) => {
                log::error!("SUB_FLOW {}: child flow failed to run: {}", node.id, err);
                Ok(failure(
                    node,
                    Some(input_snapshot),
                    format!("Child flow execution failed: {err}"),
                ))
            }
        }
    }
}

/// Extract a single `result` from the child snapshot for parent scripts:
/// the last node in execution order with a `successOutput.result`, with a
/// `{result: x}` wrapper unwrapped to `x`.
fn extract_child_result(snapshot: &Value) -> Value {
    let Some(order) = snapshot.get("nodeExecutionOrder").and_then(|v| v.as_array()) else {
        return Value::Null;
    };
    let Some(nodes) = snapshot.get("nodes").and_then(|v| v.as_object()) else {
        return Value::Null;
    };

    for node_id in order.iter().rev().filter_map(|v| v.as_str()) {
        let Some(result) = nodes
            .get(node_id)
            .and_then(|n| n.get("successOutput"))
            .and_then(|o| o.get("result"))
        else {
            continue;
        };
        if result.is_null() {
            continue;
        }
        if let Some(inner) = result.as_object().and_then(|m| m.get("result")) {
            return inner.clone();
        }
        return result.clone();
    }
    Value::Null
}

fn failure(node: &FlowNode, input: Option<JsonMap>, error: impl Into<String>) -> NodeRecord {
    let record = NodeRecord::failure(&node.id, NodeType::SubFlow, error);
    match input {
        Some(input) => record.with_input(input),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_child_result_walks_order_backwards() {
        let snapshot = json!({
            "nodeExecutionOrder": ["start", "s1", "s2", "end"],
            "nodes": {
                "start": { "output": { "body": {} } },
                "s1": { "successOutput": { "result": 1 } },
                "s2": { "successOutput": { "result": { "result": 99 } } },
                "end": { "output": {} },
            }
        });
        // s2 is the last node with a result; its wrapper unwraps.
        assert_eq!(extract_child_result(&snapshot), json!(99));
    }

    #[test]
    fn test_extract_child_result_missing() {
        assert_eq!(extract_child_result(&Value::Null), Value::Null);
        let snapshot = json!({ "nodeExecutionOrder": ["a"], "nodes": { "a": {} } });
        assert_eq!(extract_child_result(&snapshot), Value::Null);
    }

    #[tokio::test]
    async fn test_missing_target_flow_id() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = FlowNode::new("sf1", NodeType::SubFlow);

        let services = RunServices::unconfigured();
        let record = SubFlowExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
        assert!(record.error_message.unwrap().contains("targetFlowId"));
    }

    #[tokio::test]
    async fn test_unknown_target_flow() {
        let mut ctx = FlowContext::create("f1", "e1");
        let mut node = FlowNode::new("sf1", NodeType::SubFlow);
        node.config.insert("targetFlowId".into(), json!("ghost"));

        let services = RunServices::unconfigured();
        let record = SubFlowExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
        assert!(record.error_message.unwrap().contains("Target flow not found"));
    }
}
