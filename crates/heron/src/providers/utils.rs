use anyhow::{anyhow, Result};
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

use super::base::TextStream;
use crate::models::function::{FunctionCall, FunctionSpec};
use crate::models::role::{ReplayEntry, Role};

/// Appended to a reply when the upstream stops sending tokens
pub const STALL_NOTE: &str = "\n\n(The response was cut short because the model stopped responding.)";

/// Convert the model-replay view to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[ReplayEntry]) -> Vec<Value> {
    messages
        .iter()
        .map(|entry| {
            let mut converted = match entry.role {
                Role::System => json!({"role": "system", "content": entry.content}),
                Role::User => json!({"role": "user", "content": entry.content}),
                Role::Assistant => json!({"role": "assistant", "content": entry.content}),
                // OpenAI has no error role, the model sees it as a system note
                Role::Error => json!({
                    "role": "system",
                    "content": format!("An error occurred: {}", entry.content)
                }),
            };
            if let Some(name) = &entry.name {
                converted["name"] = json!(sanitize_function_name(name));
            }
            converted
        })
        .collect()
}

/// Convert function specs to OpenAI's API tool specification
pub fn tools_to_openai_spec(functions: &[FunctionSpec]) -> Result<Vec<Value>> {
    let mut names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for function in functions {
        if !names.insert(&function.name) {
            return Err(anyhow!("Duplicate tool name: {}", function.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": function.name,
                "description": function.description,
                "parameters": function.parameters,
            }
        }));
    }

    Ok(result)
}

/// Extract the text content of the first choice of a completion
pub fn openai_response_text(response: &Value) -> Result<&str> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| anyhow!("Response did not contain any message content"))
}

/// Extract the first function call of a completion, if the model made one
pub fn openai_response_to_function_call(response: &Value) -> Result<Option<FunctionCall>> {
    let Some(tool_call) = response["choices"][0]["message"]["tool_calls"]
        .as_array()
        .and_then(|calls| calls.first())
    else {
        return Ok(None);
    };

    let name = tool_call["function"]["name"].as_str().unwrap_or_default();
    if !is_valid_function_name(name) {
        return Err(anyhow!(
            "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
            name
        ));
    }

    let arguments = match tool_call["function"]["arguments"].as_str() {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map_err(|e| {
            anyhow!("Could not interpret arguments for function {}: {}", name, e)
        })?,
        _ => json!({}),
    };

    Ok(Some(FunctionCall::new(name, arguments)))
}

/// Turn an OpenAI server-sent event body into a stream of text deltas
pub fn openai_sse_to_text<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut events = Box::pin(body.eventsource());

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow!("Failed to read the event stream: {}", e))?;
            let data = event.data.trim();
            if data == "[DONE]" {
                break;
            }
            if data.is_empty() {
                continue;
            }

            let chunk: Value = serde_json::from_str(data)?;
            if let Some(error) = chunk.get("error") {
                Err::<(), _>(anyhow!("OpenAI API error: {}", error))?;
            }
            if let Some(delta) = chunk["choices"][0]["delta"]["content"].as_str() {
                if !delta.is_empty() {
                    yield delta.to_string();
                }
            }
        }
    })
}

/// End a token stream early, with a visible note, when no token arrives within `timeout`.
///
/// `None` leaves the stream untouched.
pub fn with_stall_timeout(stream: TextStream, timeout: Option<Duration>) -> TextStream {
    let Some(timeout) = timeout else {
        return stream;
    };

    Box::pin(async_stream::stream! {
        let mut stream = stream;
        loop {
            match tokio::time::timeout(timeout, stream.next()).await {
                Ok(Some(item)) => yield item,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Token stream stalled");
                    yield Ok(STALL_NOTE.to_string());
                    break;
                }
            }
        }
    })
}

fn function_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").ok())
        .as_ref()
}

fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_valid_function_name(name: &str) -> bool {
    function_name_pattern().is_some_and(|re| re.is_match(name))
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn sse(chunks: Vec<&'static str>) -> TextStream {
        openai_sse_to_text(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, anyhow::Error>(c.as_bytes().to_vec())),
        ))
    }

    #[test]
    fn test_messages_to_openai_spec() {
        let spec = messages_to_openai_spec(&[
            ReplayEntry::system("Be brief."),
            ReplayEntry::user("Hello"),
            ReplayEntry::assistant("Searching...").with_name("count records"),
            ReplayEntry::new(Role::Error, "boom"),
        ]);

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(spec[1], json!({"role": "user", "content": "Hello"}));
        assert_eq!(spec[2]["name"], "count_records");
        assert_eq!(
            spec[3],
            json!({"role": "system", "content": "An error occurred: boom"})
        );
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let spec = tools_to_openai_spec(&[FunctionSpec::new(
            "converse",
            "Reply in a friendly manner",
            json!({"type": "object", "properties": {}}),
        )])?;
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "converse");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let function = FunctionSpec::new("converse", "x", json!({}));
        let result = tools_to_openai_spec(&[function.clone(), function]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name(""));
    }

    #[test]
    fn test_function_call_parsing() -> Result<()> {
        let response = json!({
            "choices": [{"message": {"tool_calls": [{
                "id": "1",
                "type": "function",
                "function": {"name": "converse", "arguments": "{\"tone\": \"warm\"}"}
            }]}}]
        });
        assert_eq!(
            openai_response_to_function_call(&response)?,
            Some(FunctionCall::new("converse", json!({"tone": "warm"})))
        );

        let no_call = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(openai_response_to_function_call(&no_call)?, None);

        let bad_name = json!({
            "choices": [{"message": {"tool_calls": [{
                "function": {"name": "bad name", "arguments": "{}"}
            }]}}]
        });
        assert!(openai_response_to_function_call(&bad_name).is_err());
        Ok(())
    }

    #[test]
    fn test_check_context_length_error() {
        let error = json!({"code": "context_length_exceeded", "message": "too long"});
        assert!(check_openai_context_length_error(&error).is_some());
        assert!(check_openai_context_length_error(&json!({"code": "other"})).is_none());
    }

    #[tokio::test]
    async fn test_sse_deltas_across_chunk_boundaries() {
        let stream = sse(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"lo \\u00e9\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hel", "lo é"]);
    }

    #[tokio::test]
    async fn test_sse_error_event() {
        let mut stream = sse(vec!["data: {\"error\": {\"message\": \"overloaded\"}}\n\n"]);
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_stall_timeout_appends_note() {
        let stalled: TextStream = Box::pin(
            stream::iter(vec![Ok("partial".to_string())]).chain(stream::pending()),
        );
        let fragments: Vec<String> =
            with_stall_timeout(stalled, Some(Duration::from_millis(20)))
                .map(|f| f.unwrap())
                .collect()
                .await;
        assert_eq!(fragments, vec!["partial".to_string(), STALL_NOTE.to_string()]);
    }

    #[tokio::test]
    async fn test_stall_timeout_disabled() {
        let stream: TextStream = Box::pin(stream::iter(vec![Ok("a".to_string())]));
        let fragments: Vec<String> = with_stall_timeout(stream, None)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["a"]);
    }
}
