//! MAPPER node
//!
//! Resolves a configured output template into a concrete map; the result
//! becomes the input shape for whatever comes next.
//!
//! ```json
//! {
//!   "output": {
//!     "email":  "{{variables.email}}",
//!     "amount": "{{nodes.start.output.body.amount}}",
//!     "plan":   "premium"
//!   }
//! }
//! ```

use async_trait::async_trait;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus,
    NodeType, RunServices,
};

pub struct MapperExecutor;

#[async_trait]
impl NodeExecutor for MapperExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Mapper
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let template = node
            .config
            .get("output")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let resolved = resolver::resolve_map(&template, ctx);

        Ok(NodeRecord::new(&node.id, NodeType::Mapper, NodeStatus::Success).with_output(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mapper_resolves_template_with_native_types() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.set_variable("amount", json!(120));

        let mut node = FlowNode::new("m1", NodeType::Mapper);
        node.config.insert(
            "output".into(),
            json!({ "amount": "{{variables.amount}}", "plan": "premium" }),
        );

        let services = RunServices::unconfigured();
        let record = MapperExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        let output = record.output.unwrap();
        assert_eq!(output.get("amount"), Some(&json!(120)));
        assert_eq!(output.get("plan"), Some(&json!("premium")));
    }

    #[tokio::test]
    async fn test_mapper_without_template_yields_empty_output() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = FlowNode::new("m1", NodeType::Mapper);

        let services = RunServices::unconfigured();
        let record = MapperExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.output, Some(JsonMap::new()));
        assert_eq!(record.status, NodeStatus::Success);
    }
}
