//! SUCCESS and FAILURE terminal nodes
//!
//! Resolve a configured response template and end the run with the node's
//! fixed status.
//!
//! ```json
//! {
//!   "response": {
//!     "message": "Flow completed",
//!     "userId":  "{{variables.userId}}"
//!   }
//! }
//! ```

use async_trait::async_trait;

use skein_engine::{
    resolver, FlowContext, FlowNode, NodeError, NodeExecutor, NodeRecord, NodeStatus, NodeType,
    RunServices,
};

fn execute_terminal(node: &FlowNode, ctx: &FlowContext, node_type: NodeType, status: NodeStatus) -> NodeRecord {
    let template = node
        .config
        .get("response")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let resolved = resolver::resolve_map(&template, ctx);

    NodeRecord::new(&node.id, node_type, status).with_output(resolved)
}

pub struct SuccessExecutor;

#[async_trait]
impl NodeExecutor for SuccessExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Success
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        Ok(execute_terminal(node, ctx, NodeType::Success, NodeStatus::Success))
    }
}

pub struct FailureExecutor;

#[async_trait]
impl NodeExecutor for FailureExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Failure
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        Ok(execute_terminal(node, ctx, NodeType::Failure, NodeStatus::Failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_terminal_resolves_response() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.set_variable("userId", json!("u-42"));

        let mut node = FlowNode::new("end", NodeType::Success);
        node.config.insert(
            "response".into(),
            json!({ "message": "done", "userId": "{{variables.userId}}" }),
        );

        let services = RunServices::unconfigured();
        let record = SuccessExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Success);
        assert_eq!(record.output.unwrap().get("userId"), Some(&json!("u-42")));
    }

    #[tokio::test]
    async fn test_failure_terminal_status() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = FlowNode::new("end", NodeType::Failure);

        let services = RunServices::unconfigured();
        let record = FailureExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Failure);
    }
}
