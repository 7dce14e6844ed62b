//! Google Gemini client.

use serde_json::{json, Value};
use smz_models::{ModelId, TokenUsage};

use crate::client::{Attachment, GenerateRequest, Generated, LlmClient, StreamHandle};
use crate::error::{LlmError, LlmResult};
use crate::openai::{spawn_sse_pump, StreamPumpItem};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client.
pub struct GoogleClient {
    model: ModelId,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleClient {
    pub fn new(model: ModelId, api_key: String) -> Self {
        Self {
            model,
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    fn body(&self, request: &GenerateRequest) -> Value {
        let mut parts = vec![json!({"text": request.prompt})];
        for attachment in &request.attachments {
            let (media_type, data) = match attachment {
                Attachment::Image {
                    media_type,
                    data_base64,
                } => (media_type, data_base64),
                Attachment::File {
                    media_type,
                    data_base64,
                    ..
                } => (media_type, data_base64),
            };
            parts.push(json!({
                "inline_data": {"mime_type": media_type, "data": data}
            }));
        }

        let mut body = json!({
            "contents": [{"parts": parts}],
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(max) = request.max_output_tokens {
            body["generationConfig"] = json!({"maxOutputTokens": max});
        }
        body
    }

    async fn send(&self, endpoint: &str, request: &GenerateRequest) -> LlmResult<reqwest::Response> {
        let url = format!(
            "{}/models/{}:{}",
            self.base_url, self.model.name, endpoint
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(&self.body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(
                "google",
                &self.model.to_string(),
                status.as_u16(),
                &body,
            ));
        }
        Ok(response)
    }
}

fn parse_usage(value: &Value) -> TokenUsage {
    TokenUsage {
        prompt: value["promptTokenCount"].as_u64(),
        completion: value["candidatesTokenCount"].as_u64(),
        total: value["totalTokenCount"].as_u64(),
    }
}

fn parse_candidate_text(value: &Value) -> String {
    let mut text = String::new();
    if let Some(parts) = value["candidates"][0]["content"]["parts"].as_array() {
        for part in parts {
            text.push_str(part["text"].as_str().unwrap_or_default());
        }
    }
    text
}

fn parse_stream_data(data: &str) -> StreamPumpItem {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return StreamPumpItem::Ignore;
    };
    let text = parse_candidate_text(&value);
    if !text.is_empty() {
        return StreamPumpItem::Delta(text);
    }
    if value["usageMetadata"].is_object() {
        return StreamPumpItem::Usage(parse_usage(&value["usageMetadata"]));
    }
    StreamPumpItem::Ignore
}

#[async_trait::async_trait]
impl LlmClient for GoogleClient {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> LlmResult<Generated> {
        let response = self.send("generateContent", request).await?;
        let value: Value = response.json().await?;
        Ok(Generated {
            text: parse_candidate_text(&value),
            usage: parse_usage(&value["usageMetadata"]),
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> LlmResult<StreamHandle> {
        let response = self.send("streamGenerateContent?alt=sse", request).await?;
        Ok(spawn_sse_pump(response, |data, _| parse_stream_data(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidate_text() {
        let value = json!({
            "candidates": [{"content": {"parts": [{"text": "A"}, {"text": "B"}]}}],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 2, "totalTokenCount": 11}
        });
        assert_eq!(parse_candidate_text(&value), "AB");
        let usage = parse_usage(&value["usageMetadata"]);
        assert_eq!(usage.total, Some(11));
    }

    #[test]
    fn test_stream_data_delta_and_usage() {
        let delta = parse_stream_data(
            r#"{"candidates":[{"content":{"parts":[{"text":"chunk"}]}}]}"#,
        );
        assert!(matches!(delta, StreamPumpItem::Delta(d) if d == "chunk"));

        let usage = parse_stream_data(r#"{"usageMetadata":{"promptTokenCount":3}}"#);
        assert!(matches!(usage, StreamPumpItem::Usage(u) if u.prompt == Some(3)));
    }
}
