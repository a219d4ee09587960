use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, TextStream, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_text,
    openai_response_to_function_call, openai_sse_to_text, tools_to_openai_spec,
    with_stall_timeout,
};
use crate::models::function::{FunctionCall, FunctionSpec, ResponseSchema};
use crate::models::role::ReplayEntry;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage["prompt_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = usage["completion_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = usage["total_tokens"]
            .as_i64()
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn payload(&self, messages: &[ReplayEntry]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages),
        });
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        payload
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = check_openai_context_length_error(&body["error"]) {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let response: Value = self.send(&payload).await?.json().await?;

        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let usage = Self::get_usage(&response);
        tracing::debug!(
            model = %self.config.model,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "Completion finished"
        );
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete_structured(
        &self,
        messages: &[ReplayEntry],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        let mut payload = self.payload(messages);
        payload["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
            }
        });

        let response = self.post(payload).await?;
        let text = openai_response_text(&response)?;
        serde_json::from_str(text).map_err(|e| anyhow!("Model returned invalid JSON: {}", e))
    }

    async fn choose_function(
        &self,
        messages: &[ReplayEntry],
        functions: &[FunctionSpec],
    ) -> Result<Option<FunctionCall>> {
        let mut payload = self.payload(messages);
        payload["tools"] = json!(tools_to_openai_spec(functions)?);
        payload["tool_choice"] = json!("required");

        let response = self.post(payload).await?;
        openai_response_to_function_call(&response)
    }

    async fn stream_text(&self, messages: &[ReplayEntry]) -> Result<TextStream> {
        let mut payload = self.payload(messages);
        payload["stream"] = json!(true);

        let response = self.send(&payload).await?;
        let tokens = openai_sse_to_text(response.bytes_stream());
        Ok(with_stall_timeout(tokens, self.config.stall_timeout))
    }
}
