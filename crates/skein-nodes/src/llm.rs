//! OpenAI-compatible chat client
//!
//! A [`LanguageModel`] implementation for any endpoint speaking the
//! `/chat/completions` protocol. The API key lives inside this client,
//! injected at construction; it never transits the engine or the resolver.

use async_trait::async_trait;
use serde_json::{json, Value};

use skein_engine::{LanguageModel, LlmRequest, LlmResponse};

pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn call(&self, request: &LlmRequest) -> LlmResponse {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return LlmResponse::error(format!("LLM request failed: {err}")),
        };

        let status = response.status();
        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(err) => return LlmResponse::error(format!("LLM response was not JSON: {err}")),
        };
        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return LlmResponse::error(format!("LLM returned HTTP {status}: {message}"));
        }

        parse_completion(&payload, model)
    }
}

fn parse_completion(payload: &Value, requested_model: String) -> LlmResponse {
    let Some(content) = payload
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
    else {
        return LlmResponse::error("LLM response had no choices[0].message.content");
    };

    LlmResponse {
        success: true,
        raw_text: content.to_string(),
        error_message: None,
        model: payload
            .get("model")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(Some(requested_model)),
        input_tokens: payload
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        output_tokens: payload
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    }
}
