//! Anthropic messages-API client.

use serde_json::{json, Value};
use smz_models::{ModelId, TokenUsage};

use crate::client::{Attachment, GenerateRequest, Generated, LlmClient, StreamHandle};
use crate::error::{LlmError, LlmResult};
use crate::openai::{spawn_sse_pump, StreamPumpItem};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic (and anthropic-compatible) client.
pub struct AnthropicClient {
    model: ModelId,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(model: ModelId, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model,
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut content = vec![json!({"type": "text", "text": request.prompt})];
        for attachment in &request.attachments {
            match attachment {
                Attachment::Image {
                    media_type,
                    data_base64,
                } => content.push(json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": media_type, "data": data_base64}
                })),
                Attachment::File {
                    media_type,
                    data_base64,
                    ..
                } => content.push(json!({
                    "type": "document",
                    "source": {"type": "base64", "media_type": media_type, "data": data_base64}
                })),
            }
        }

        let mut body = json!({
            "model": self.model.name,
            "max_tokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": content}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, body: &Value, request: &GenerateRequest) -> LlmResult<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(request.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(
                "anthropic",
                &self.model.to_string(),
                status.as_u16(),
                &body,
            ));
        }
        Ok(response)
    }
}

fn parse_usage(value: &Value) -> TokenUsage {
    let prompt = value["input_tokens"].as_u64();
    let completion = value["output_tokens"].as_u64();
    TokenUsage {
        prompt,
        completion,
        total: match (prompt, completion) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        },
    }
}

fn parse_message_response(value: &Value) -> Generated {
    let mut text = String::new();
    if let Some(blocks) = value["content"].as_array() {
        for block in blocks {
            if block["type"] == "text" {
                text.push_str(block["text"].as_str().unwrap_or_default());
            }
        }
    }
    Generated {
        text,
        usage: parse_usage(&value["usage"]),
    }
}

/// Decode one streaming event (`content_block_delta` carries the text;
/// `message_start`/`message_delta` carry usage; `message_stop` ends).
fn parse_stream_event(data: &str, event: Option<&str>) -> StreamPumpItem {
    if event == Some("message_stop") {
        return StreamPumpItem::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return StreamPumpItem::Ignore;
    };
    match value["type"].as_str() {
        Some("content_block_delta") => {
            let delta = value["delta"]["text"].as_str().unwrap_or_default();
            if delta.is_empty() {
                StreamPumpItem::Ignore
            } else {
                StreamPumpItem::Delta(delta.to_string())
            }
        }
        Some("message_start") => StreamPumpItem::Usage(parse_usage(&value["message"]["usage"])),
        Some("message_delta") => StreamPumpItem::Usage(parse_usage(&value["usage"])),
        Some("message_stop") => StreamPumpItem::Done,
        _ => StreamPumpItem::Ignore,
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> LlmResult<Generated> {
        let body = self.body(request, false);
        let response = self.send(&body, request).await?;
        let value: Value = response.json().await?;
        Ok(parse_message_response(&value))
    }

    async fn stream(&self, request: &GenerateRequest) -> LlmResult<StreamHandle> {
        let body = self.body(request, true);
        let response = self.send(&body, request).await?;
        Ok(spawn_sse_pump(response, parse_stream_event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_response() {
        let value = json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "there"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 4}
        });
        let out = parse_message_response(&value);
        assert_eq!(out.text, "Hello there");
        assert_eq!(out.usage.total, Some(16));
    }

    #[test]
    fn test_parse_stream_delta() {
        let item = parse_stream_event(
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}"#,
            Some("content_block_delta"),
        );
        assert!(matches!(item, StreamPumpItem::Delta(d) if d == "Hi"));
    }

    #[test]
    fn test_parse_stream_stop() {
        assert!(matches!(
            parse_stream_event("{}", Some("message_stop")),
            StreamPumpItem::Done
        ));
    }

    #[test]
    fn test_usage_total_null_when_partial() {
        let usage = parse_usage(&json!({"output_tokens": 5}));
        assert_eq!(usage.prompt, None);
        assert_eq!(usage.completion, Some(5));
        assert_eq!(usage.total, None);
    }
}
