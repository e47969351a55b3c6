//! NEXUS node
//!
//! One outbound call through a saved connector. The node resolves its
//! per-node overrides (path, method, headers, body) and delegates the
//! actual call to the connector gateway, which owns connector lookup,
//! base URL, auth, and transport.
//!
//! ```json
//! {
//!   "connectorId": "billing-api",
//!   "path":        "/users/{{variables.userId}}/invoices",
//!   "method":      "POST",
//!   "headers":     { "X-Request-Id": "{{meta.executionId}}" },
//!   "body":        { "amount": "{{variables.amount}}" }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use skein_engine::{
    resolver, ConnectorRequest, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor,
    NodeRecord, NodeStatus, NodeType, RunServices,
};

pub struct NexusExecutor;

#[async_trait]
impl NodeExecutor for NexusExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Nexus
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let Some(connector_id) = node
            .config_str("connectorId")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(NodeRecord::failure(
                &node.id,
                NodeType::Nexus,
                "NEXUS node has no connectorId configured",
            ));
        };

        let path = resolver::resolve(node.config_str("path").unwrap_or_default(), ctx);
        let method = node.config_str("method").unwrap_or("GET").to_ascii_uppercase();
        let headers = resolver::resolve_map(
            &node
                .config
                .get("headers")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
            ctx,
        );
        let body = resolver::resolve_map(
            &node
                .config
                .get("body")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
            ctx,
        );

        let mut input_snapshot = JsonMap::new();
        input_snapshot.insert("connectorId".into(), Value::String(connector_id.to_string()));
        input_snapshot.insert("path".into(), Value::String(path.clone()));
        input_snapshot.insert("method".into(), Value::String(method.clone()));
        input_snapshot.insert("body".into(), Value::Object(body.clone()));

        let request = ConnectorRequest {
            connector_id: connector_id.to_string(),
            path,
            method,
            headers,
            body,
        };
        let response = services.connectors.execute(&request).await;

        if response.success {
            let mut success_output = JsonMap::new();
            if let Some(code) = response.status_code {
                success_output.insert("statusCode".into(), Value::from(code));
            }
            success_output.insert("body".into(), response.body);
            if let Some(rows) = response.rows {
                success_output.insert("rows".into(), Value::Array(rows));
            }

            Ok(NodeRecord::new(&node.id, NodeType::Nexus, NodeStatus::Success)
                .with_input(input_snapshot)
                .with_success_output(success_output))
        } else {
            let error = response
                .error
                .unwrap_or_else(|| "Connector call failed".to_string());
            let mut failure_output = JsonMap::new();
            if let Some(code) = response.status_code {
                failure_output.insert("statusCode".into(), Value::from(code));
            }
            failure_output.insert("body".into(), response.body);
            failure_output.insert("error".into(), Value::String(error.clone()));

            Ok(NodeRecord::new(&node.id, NodeType::Nexus, NodeStatus::Failure)
                .with_input(input_snapshot)
                .with_failure_output(failure_output)
                .with_error(error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skein_engine::{ConnectorGateway, ConnectorResponse};
    use std::sync::{Arc, Mutex};

    /// Records the request it was given and returns a canned response.
    struct RecordingGateway {
        response: ConnectorResponse,
        seen: Mutex<Option<ConnectorRequest>>,
    }

    #[async_trait]
    impl ConnectorGateway for RecordingGateway {
        async fn execute(&self, request: &ConnectorRequest) -> ConnectorResponse {
            *self.seen.lock().unwrap() = Some(request.clone());
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_missing_connector_id() {
        let mut ctx = FlowContext::create("f1", "e1");
        let node = FlowNode::new("n1", NodeType::Nexus);
        let services = RunServices::unconfigured();

        let record = NexusExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Failure);
        assert!(record.error_message.unwrap().contains("connectorId"));
    }

    #[tokio::test]
    async fn test_resolved_overrides_reach_the_gateway() {
        let mut ctx = FlowContext::create("f1", "e1");
        ctx.set_variable("userId", json!("u-7"));

        let mut node = FlowNode::new("n1", NodeType::Nexus);
        node.config.insert("connectorId".into(), json!("billing"));
        node.config.insert("path".into(), json!("/users/{{variables.userId}}"));
        node.config.insert("method".into(), json!("post"));
        node.config.insert("body".into(), json!({ "id": "{{variables.userId}}" }));

        let gateway = Arc::new(RecordingGateway {
            response: ConnectorResponse {
                success: true,
                status_code: Some(201),
                body: json!({ "created": true }),
                rows: None,
                error: None,
            },
            seen: Mutex::new(None),
        });
        let mut services = RunServices::unconfigured();
        services.connectors = gateway.clone();

        let record = NexusExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(record.status, NodeStatus::Success);
        let output = record.success_output.unwrap();
        assert_eq!(output.get("statusCode"), Some(&json!(201)));
        assert_eq!(output.get("body"), Some(&json!({ "created": true })));

        let seen = gateway.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.path, "/users/u-7");
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.body.get("id"), Some(&json!("u-7")));
    }

    #[tokio::test]
    async fn test_gateway_failure_routes_failure() {
        let mut ctx = FlowContext::create("f1", "e1");
        let mut node = FlowNode::new("n1", NodeType::Nexus);
        node.config.insert("connectorId".into(), json!("billing"));

        let gateway = Arc::new(RecordingGateway {
            response: ConnectorResponse {
                success: false,
                status_code: Some(503),
                body: json!("unavailable"),
                rows: None,
                error: Some("HTTP 503 Service Unavailable".into()),
            },
            seen: Mutex::new(None),
        });
        let mut services = RunServices::unconfigured();
        services.connectors = gateway;

        let record = NexusExecutor.execute(&node, &mut ctx, &services).await.unwrap();
        assert_eq!(record.status, NodeStatus::Failure);
        let output = record.failure_output.unwrap();
        assert_eq!(output.get("statusCode"), Some(&json!(503)));
        assert!(record.error_message.unwrap().contains("503"));
    }
}
