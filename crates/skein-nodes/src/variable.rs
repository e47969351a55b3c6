//! VARIABLE node
//!
//! Resolves a map of variable definitions and writes each into the run's
//! variable container.
//!
//! ```json
//! {
//!   "variables": {
//!     "userId":   "static-value",
//!     "userPlan": "{{nodes.fetchUser.successOutput.body.plan}}"
//!   }
//! }
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, NodeError, NodeExecutor, NodeRecord, NodeStatus,
    NodeType, RunServices,
};

static INT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static FLOAT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(\d+\.\d*|\d*\.\d+)$").unwrap());

pub struct VariableExecutor;

#[async_trait]
impl NodeExecutor for VariableExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Variable
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        _services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let definitions = node
            .config
            .get("variables")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let resolved = resolver::resolve_map(&definitions, ctx);

        let mut output = JsonMap::new();
        for (key, value) in resolved {
            let normalized = normalize_variable_value(value);
            ctx.set_variable(key.clone(), normalized.clone());
            output.insert(key, normalized);
        }

        Ok(NodeRecord::new(&node.id, NodeType::Variable, NodeStatus::Success).with_output(output))
    }
}

/// Preserve numeric types so `{{variables.a + variables.b}}` does numeric
/// addition: strings like "10" or "20.5" become actual numbers.
fn normalize_variable_value(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return value;
    }
    if INT_PATTERN.is_match(trimmed) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
        return value;
    }
    if FLOAT_PATTERN.is_match(trimmed) {
        if let Ok(f) = trimmed.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_variable_value(json!("10")), json!(10));
        assert_eq!(normalize_variable_value(json!("-3")), json!(-3));
        assert_eq!(normalize_variable_value(json!("20.5")), json!(20.5));
        assert_eq!(normalize_variable_value(json!(".5")), json!(0.5));
        assert_eq!(normalize_variable_value(json!("abc")), json!("abc"));
        assert_eq!(normalize_variable_value(json!("")), json!(""));
        assert_eq!(normalize_variable_value(json!(7)), json!(7));
        assert_eq!(normalize_variable_value(json!(true)), json!(true));
    }

    #[tokio::test]
    async fn test_variables_written_and_normalized() {
        let mut ctx = FlowContext::create("f1", "e1");
        let mut node = FlowNode::new("v1", NodeType::Variable);
        node.config.insert(
            "variables".into(),
            json!({ "count": "10", "name": "alice" }),
        );

        let services = RunServices::unconfigured();
        let record = VariableExecutor.execute(&node, &mut ctx, &services).await.unwrap();

        assert_eq!(ctx.variable("count"), Some(&json!(10)));
        assert_eq!(ctx.variable("name"), Some(&json!("alice")));
        assert_eq!(record.output.unwrap().get("count"), Some(&json!(10)));

        // The whole point: arithmetic now works downstream.
        assert_eq!(resolver::resolve("{{variables.count + variables.count}}", &ctx), "20");
    }
}
