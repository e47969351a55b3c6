//! Pluggable capability contracts
//!
//! Narrow interfaces the engine calls into for work it does not own:
//! sandboxed script execution, language-model calls, and outbound connector
//! calls. Implementations live outside the core; `Unconfigured*` stubs let a
//! registry run pure data flows without wiring any of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::JsonMap;

/// Result of running user code. Tagged, never an error: the harness must
/// catch everything, including its own timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    Completed(Value),
    Failed(String),
}

impl ScriptOutcome {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Runs user-supplied code with a JSON input object and returns its JSON
/// result. Must enforce an internal timeout and forcibly terminate the code
/// on expiry.
#[async_trait]
pub trait ScriptHarness: Send + Sync {
    async fn run(&self, language: &str, code: &str, input: &Value) -> ScriptOutcome;
}

/// A single language-model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Model response. `success == false` carries `error_message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub success: bool,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl LlmResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(msg.into()),
            ..Self::default()
        }
    }
}

/// Calls a language model. Credential storage and provider selection live
/// behind the implementation; keys never transit the engine.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn call(&self, request: &LlmRequest) -> LlmResponse;
}

/// One outbound call through a saved connector, with per-node overrides
/// already resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRequest {
    pub connector_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: JsonMap,
    #[serde(default)]
    pub body: JsonMap,
}

/// Connector call result: an HTTP response body or a database row set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectorResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            ..Self::default()
        }
    }
}

/// Resolves a connector plus overrides into a single outbound call.
#[async_trait]
pub trait ConnectorGateway: Send + Sync {
    async fn execute(&self, request: &ConnectorRequest) -> ConnectorResponse;
}

/// Stub harness for registries without script execution wired.
pub struct UnconfiguredScriptHarness;

#[async_trait]
impl ScriptHarness for UnconfiguredScriptHarness {
    async fn run(&self, _language: &str, _code: &str, _input: &Value) -> ScriptOutcome {
        ScriptOutcome::failed("No script harness configured")
    }
}

/// Stub model for registries without an LLM wired.
pub struct UnconfiguredLanguageModel;

#[async_trait]
impl LanguageModel for UnconfiguredLanguageModel {
    async fn call(&self, _request: &LlmRequest) -> LlmResponse {
        LlmResponse::error("No language model configured")
    }
}

/// Stub gateway for registries without connectors wired.
pub struct UnconfiguredConnectorGateway;

#[async_trait]
impl ConnectorGateway for UnconfiguredConnectorGateway {
    async fn execute(&self, _request: &ConnectorRequest) -> ConnectorResponse {
        ConnectorResponse::error("No connector gateway configured")
    }
}
