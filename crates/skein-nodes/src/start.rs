//! START node
//!
//! Marks itself as success; the trigger payload is pre-loaded into the
//! context by the engine and the engine never overwrites that record.

use async_trait::async_trait;

use skein_engine::{
    FlowContext, FlowNode, NodeError, NodeExecutor, NodeRecord, NodeStatus, NodeType, RunServices,
};

pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn execute(
        &self,
        node: &FlowNode,
        _ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        Ok(NodeRecord::new(&node.id, NodeType::Start, NodeStatus::Success))
    }
}
