//! SCRIPT node
//!
//! Runs user-written JavaScript or Python through the pluggable script
//! harness.
//!
//! ```json
//! {
//!   "language": "javascript",
//!   "code":     "return input.nodes.fetchUser.successOutput.body.items.length;"
//! }
//! ```
//!
//! The script receives an `input` object:
//!
//! ```json
//! {
//!   "variables": { ... },
//!   "nodes":     { ...previous node results, keyed by id and label alias... },
//!   "trigger":   { ...the original trigger payload from the START node... }
//! }
//! ```
//!
//! JavaScript uses `return`; Python assigns the final value to `result`.
//! SUCCESS edge: script ran without error, return value in
//! `successOutput.result`. FAILURE edge: script threw, message in
//! `failureOutput.error`.

use async_trait::async_trait;
use serde_json::Value;

use skein_engine::{
    FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus, NodeType,
    RunServices, ScriptOutcome,
};

pub struct ScriptExecutor;

#[async_trait]
impl NodeExecutor for ScriptExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Script
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let language = node.config_str("language").unwrap_or("javascript").to_string();
        let code = node.config_str("code").unwrap_or_default();

        if code.trim().is_empty() {
            return Ok(NodeRecord::failure(
                &node.id,
                NodeType::Script,
                "SCRIPT node has no code. Open the node and write your script.",
            ));
        }

        let input = build_script_input(ctx);
        let outcome = services.scripts.run(&language, code, &input).await;

        match outcome {
            ScriptOutcome::Completed(result) => {
                let mut success_output = JsonMap::new();
                success_output.insert("result".into(), result);
                success_output.insert("language".into(), Value::String(language.clone()));

                let mut input_snapshot = JsonMap::new();
                input_snapshot.insert("language".into(), Value::String(language));
                input_snapshot.insert("codeLength".into(), Value::from(code.len()));

                Ok(NodeRecord::new(&node.id, NodeType::Script, NodeStatus::Success)
                    .with_input(input_snapshot)
                    .with_success_output(success_output))
            }
            ScriptOutcome::Failed(error) => {
                Ok(NodeRecord::failure(&node.id, NodeType::Script, error))
            }
        }
    }
}

/// The `input` object injected into user scripts: variables, all previous
/// node results (id and alias keys), and the original trigger payload.
pub(crate) fn build_script_input(ctx: &FlowContext) -> Value {
    let mut input = JsonMap::new();
    input.insert(
        "variables".into(),
        serde_json::to_value(&ctx.variables).unwrap_or(Value::Null),
    );
    input.insert("nodes".into(), Value::Object(ctx.script_input_nodes()));

    let trigger = ctx
        .start_record()
        .and_then(|r| r.output.as_ref())
        .map(|o| Value::Object(o.clone()))
        .unwrap_or(Value::Null);
    input.insert("trigger".into(), trigger);

    Value::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    /// Harness that records nothing and returns a fixed outcome.
    struct FixedHarness(ScriptOutcome);

    #[async_trait]
    impl skein_engine::ScriptHarness for FixedHarness {
        async fn run(&self, _language: &str, _code: &str, _input: &Value) -> ScriptOutcome {
            self.0.clone()
        }
    }

    fn node_with_code(code: &str) -> FlowNode {
        let mut node = FlowNode::new("s1", NodeType::Script);
        node.config.insert("code".into(), json!(code));
        node
    }

    #[tokio::test]
    async fn test_blank_code_is_a_configuration_failure() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = node_with_code("   ");

        let services = RunServices::unconfigured();
        let record = ScriptExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
        assert!(record.error_message.unwrap().contains("no code"));
    }

    #[tokio::test]
    async fn test_successful_script_wraps_result() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = node_with_code("return 42;");

        let mut services = RunServices::unconfigured();
        services.scripts = Arc::new(FixedHarness(ScriptOutcome::Completed(json!(42))));
        let record = ScriptExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Success);
        let output = record.success_output.unwrap();
        assert_eq!(output.get("result"), Some(&json!(42)));
        assert_eq!(output.get("language"), Some(&json!("javascript")));
    }

    #[tokio::test]
    async fn test_script_error_routes_to_failure() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = node_with_code("throw new Error('nope')");

        let mut services = RunServices::unconfigured();
        services.scripts = Arc::new(FixedHarness(ScriptOutcome::failed("nope")));
        let record = ScriptExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
        assert_eq!(record.failure_output.unwrap().get("error"), Some(&json!("nope")));
    }

    #[test]
    fn test_script_input_shape() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.set_variable("plan", json!("basic"));
        let mut output = JsonMap::new();
        output.insert("body".into(), json!({ "amount": 10 }));
        ctx.record_node(
            "start",
            NodeRecord::new("start", NodeType::Start, NodeStatus::Success).with_output(output),
        );

        let input = build_script_input(&ctx);
        assert_eq!(input.get("variables").unwrap().get("plan"), Some(&json!("basic")));
        assert_eq!(input.get("trigger").unwrap().get("body"), Some(&json!({ "amount": 10 })));
        assert!(input.get("nodes").unwrap().get("start").is_some());
    }
}
