//! AI node
//!
//! Resolves named input bindings and every `{{...}}` reference in the
//! prompt, calls the pluggable language model once, and expects a JSON
//! object back. A response that is not parseable JSON is retried once with
//! an added "respond with JSON only" instruction before failing.
//!
//! Credential-shaped `nex` paths are refused in input bindings so key
//! material can never reach a prompt.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use skein_engine::{
    resolver, FlowContext, FlowNode, JsonMap, LlmRequest, NodeError, NodeExecutor, NodeRecord,
    NodeStatus, NodeType, RunServices,
};

static REF_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());

const MAX_INPUT_CHARS: usize = 12_000;
const DEFAULT_PROVIDER: &str = "ANTHROPIC";
const FORBIDDEN_PATH_PREFIXES: [&str; 6] = [
    "nex.dbpassword",
    "nex.password",
    "nex.apikey",
    "nex.authtoken",
    "nex.secret",
    "nex.credentials",
];

pub struct AiExecutor;

#[async_trait]
impl NodeExecutor for AiExecutor {
    fn supported_type(&self) -> NodeType {
        NodeType::Ai
    }

    async fn execute(
        &self,
        node: &FlowNode,
        ctx: &mut FlowContext,
        services: &RunServices,
    ) -> Result<NodeRecord, NodeError> {
        let provider = node.config_str("provider").unwrap_or(DEFAULT_PROVIDER).to_string();
        let model = node.config_str("model").map(str::to_string);
        let prompt = node.config_str("prompt").unwrap_or_default().to_string();
        let output_schema = node.config_str("outputSchema").map(str::to_string);
        let max_tokens = node
            .config
            .get("maxTokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(1000) as u32;
        let temperature = node
            .config
            .get("temperature")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        if prompt.trim().is_empty() {
            return Ok(failure(node, "AI node has no prompt configured."));
        }

        // Resolve input bindings, refusing credential-shaped paths.
        let bindings = node
            .config
            .get("inputBindings")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut inputs = JsonMap::new();
        for binding in &bindings {
            let name = binding.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let nex_path = binding.get("nexPath").and_then(|v| v.as_str()).unwrap_or("");
            if name.trim().is_empty() || nex_path.trim().is_empty() {
                continue;
            }
            let lowered = nex_path.to_ascii_lowercase();
            if FORBIDDEN_PATH_PREFIXES.iter().any(|f| lowered.contains(f)) {
                return Ok(failure(
                    node,
                    format!(
                        "AI node input binding '{name}' references a forbidden path. Credentials cannot be passed to AI nodes."
                    ),
                ));
            }
            let resolved = resolver::resolve_to_value(normalize_path(nex_path), ctx)
                .unwrap_or(Value::String(String::new()));
            inputs.insert(name.to_string(), resolved);
        }

        let inputs_json = serde_json::to_string(&inputs)?;
        if inputs_json.len() > MAX_INPUT_CHARS {
            return Ok(failure(
                node,
                format!(
                    "AI node inputs exceed maximum size ({MAX_INPUT_CHARS} chars). Reduce the data passed via input bindings."
                ),
            ));
        }

        let resolved_prompt = resolve_prompt_refs(&prompt, &inputs, ctx);
        if resolved_prompt.len() > MAX_INPUT_CHARS {
            return Ok(failure(
                node,
                format!(
                    "Resolved prompt is too large ({} chars). Reduce the referenced data.",
                    resolved_prompt.len()
                ),
            ));
        }

        let user_prompt = build_user_prompt(&resolved_prompt, &inputs_json, inputs.is_empty());
        let mut request = LlmRequest {
            provider: provider.clone(),
            model,
            system_prompt: build_system_prompt(output_schema.as_deref()),
            user_prompt: user_prompt.clone(),
            max_tokens,
            temperature,
        };

        let mut response = services.language_model.call(&request).await;
        if !response.success {
            return Ok(failure(
                node,
                format!(
                    "LLM call failed: {}",
                    response.error_message.unwrap_or_else(|| "unknown error".into())
                ),
            ));
        }

        let mut parsed = extract_json(&response.raw_text);
        if parsed.is_none() {
            log::warn!("AI node {}: first parse failed, retrying with JSON nudge", node.id);
            request.user_prompt = format!(
                "{user_prompt}\n\nIMPORTANT: Your response must be valid JSON only. No explanation text."
            );
            response = services.language_model.call(&request).await;
            if !response.success {
                return Ok(failure(
                    node,
                    format!(
                        "LLM retry failed: {}",
                        response.error_message.unwrap_or_else(|| "unknown error".into())
                    ),
                ));
            }
            parsed = extract_json(&response.raw_text);
        }

        let Some(parsed) = parsed else {
            return Ok(failure(
                node,
                format!(
                    "AI node could not parse a valid JSON object from the model response. Raw: {}",
                    truncate(&response.raw_text, 300)
                ),
            ));
        };

        let mut success_output = JsonMap::new();
        success_output.insert("result".into(), parsed);
        success_output.insert(
            "model".into(),
            response.model.clone().map(Value::String).unwrap_or(Value::Null),
        );
        success_output.insert("inputTokens".into(), Value::from(response.input_tokens));
        success_output.insert("outputTokens".into(), Value::from(response.output_tokens));
        success_output.insert("provider".into(), Value::String(provider.clone()));
        success_output.insert("rawResponse".into(), Value::String(response.raw_text.clone()));
        success_output.insert("resolvedPrompt".into(), Value::String(resolved_prompt));

        log::info!(
            "AI node {} completed. Tokens: {}in/{}out. Provider: {}",
            node.id,
            response.input_tokens,
            response.output_tokens,
            provider
        );

        let mut input_snapshot = JsonMap::new();
        input_snapshot.insert("provider".into(), Value::String(provider));
        input_snapshot.insert("prompt".into(), Value::String(prompt));

        Ok(NodeRecord::new(&node.id, NodeType::Ai, NodeStatus::Success)
            .with_input(input_snapshot)
            .with_success_output(success_output))
    }
}

fn build_system_prompt(output_schema: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a data processing engine embedded inside an automation workflow.\n\
         You will receive a task description and a JSON object called INPUTS.\n\
         You must ONLY work with the data provided in INPUTS.\n\
         You must return ONLY a valid JSON object with no explanation, no markdown, no code fences.\n\
         Do not attempt to access external systems, databases, credentials, or files.\n\
         Do not include any text before or after the JSON object.\n",
    );
    if let Some(schema) = output_schema.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nYour output JSON must match this schema:\n");
        prompt.push_str(schema);
        prompt.push('\n');
    }
    prompt
}

fn build_user_prompt(task_prompt: &str, inputs_json: &str, no_bindings: bool) -> String {
    if no_bindings || inputs_json == "{}" {
        format!("TASK:\n{task_prompt}\n\nRespond with a valid JSON object only.")
    } else {
        format!("TASK:\n{task_prompt}\n\nINPUTS:\n{inputs_json}\n\nRespond with a valid JSON object only.")
    }
}

/// Strip a leading `input.` so `input.nex.start.body.a` → `nex.start.body.a`.
fn normalize_path(path: &str) -> &str {
    path.strip_prefix("input.").unwrap_or(path).trim()
}

/// Resolve every `{{...}}` token in the prompt: binding names first, then
/// direct paths. `nex.start.*` falls back to `nodes.start.output.*` since
/// the trigger payload is always present there. Unresolved tokens become a
/// visible placeholder rather than silently vanishing.
fn resolve_prompt_refs(prompt: &str, inputs: &JsonMap, ctx: &FlowContext) -> String {
    if !prompt.contains("{{") {
        return prompt.to_string();
    }
    REF_PATTERN
        .replace_all(prompt, |caps: &regex::Captures<'_>| {
            let token = caps[1].trim();
            if let Some(value) = inputs.get(token) {
                return readable(value);
            }
            let path = normalize_path(token);
            let mut resolved = resolver::resolve_to_value(path, ctx);
            if resolved.is_none() {
                if let Some(rest) = path.strip_prefix("nex.start.") {
                    resolved = resolver::resolve_to_value(&format!("nodes.start.output.{rest}"), ctx);
                }
            }
            match resolved {
                Some(value) => readable(&value),
                None => {
                    log::warn!("AI node could not resolve reference '{{{{{token}}}}}', leaving placeholder");
                    format!("[unresolved: {token}]")
                }
            }
        })
        .into_owned()
}

/// Scalars print bare, objects and arrays as compact JSON.
fn readable(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Pull the first JSON object or array out of a model response, tolerating
/// markdown code fences and leading prose.
fn extract_json(raw: &str) -> Option<Value> {
    let mut cleaned = raw.trim();
    if cleaned.starts_with("```") {
        cleaned = cleaned.trim_start_matches("```");
        if let Some(newline) = cleaned.find('\n') {
            cleaned = &cleaned[newline + 1..];
        }
        cleaned = cleaned.trim_end_matches("```").trim();
    }
    let start = cleaned.find(|c| c == '{' || c == '[')?;
    serde_json::from_str(&cleaned[start..]).ok()
}

fn failure(node: &FlowNode, message: impl Into<String>) -> NodeRecord {
    let message = message.into();
    log::error!("AI node {} failed: {}", node.id, message);
    NodeRecord::failure(&node.id, NodeType::Ai, message)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}
