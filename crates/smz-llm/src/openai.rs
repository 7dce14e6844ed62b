//! OpenAI and OpenAI-compatible clients.
//!
//! The native endpoint speaks the responses wire shape; a custom base URL
//! forces chat-completions, which every compatible gateway understands.
//! The `openrouter.ai` host additionally gets its two identifying headers.

use futures_util::StreamExt;
use serde_json::{json, Value};
use smz_models::{ModelId, TokenUsage};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::client::{Attachment, GenerateRequest, Generated, LlmClient, StreamHandle};
use crate::error::{LlmError, LlmResult};
use crate::sse::SseParser;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const OPENROUTER_REFERER: &str = "https://github.com/summarize-cli/summarize";
const OPENROUTER_TITLE: &str = "summarize";

/// OpenAI(-compatible) client.
pub struct OpenAiClient {
    model: ModelId,
    provider_label: String,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    use_chat_completions: bool,
    extra_headers: Vec<(&'static str, &'static str)>,
}

impl OpenAiClient {
    /// Client against the native OpenAI endpoint.
    pub fn new(model: ModelId, api_key: String) -> Self {
        Self::compatible(model, "openai", api_key, None, false)
    }

    /// Client against OpenRouter.
    pub fn openrouter(model: ModelId, api_key: String) -> Self {
        Self::compatible(
            model,
            "openrouter",
            api_key,
            Some(OPENROUTER_BASE_URL.to_string()),
            true,
        )
    }

    /// General OpenAI-compatible construction.
    ///
    /// A custom base URL always forces the chat-completions shape.
    pub fn compatible(
        model: ModelId,
        provider_label: &str,
        api_key: String,
        base_url: Option<String>,
        use_chat_completions: bool,
    ) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let custom_base = base_url != DEFAULT_BASE_URL;

        let extra_headers: Vec<(&'static str, &'static str)> =
            if base_url.contains("openrouter.ai") {
                vec![
                    ("HTTP-Referer", OPENROUTER_REFERER),
                    ("X-Title", OPENROUTER_TITLE),
                ]
            } else {
                Vec::new()
            };

        Self {
            model,
            provider_label: provider_label.to_string(),
            http: reqwest::Client::new(),
            api_key,
            base_url,
            use_chat_completions: use_chat_completions || custom_base,
            extra_headers,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key);
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, *value);
        }
        builder
    }

    fn chat_body(&self, request: &GenerateRequest, stream: bool) -> LlmResult<Value> {
        let mut content = vec![json!({"type": "text", "text": request.prompt})];
        for attachment in &request.attachments {
            match attachment {
                Attachment::Image {
                    media_type,
                    data_base64,
                } => content.push(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{media_type};base64,{data_base64}")}
                })),
                Attachment::File { media_type, .. } => {
                    return Err(LlmError::AttachmentUnsupported {
                        model: self.model.to_string(),
                        media_type: media_type.clone(),
                    })
                }
            }
        }

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": content}));

        let mut body = json!({
            "model": self.model.name,
            "messages": messages,
        });
        if let Some(max) = request.max_output_tokens {
            body["max_tokens"] = json!(max);
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }
        Ok(body)
    }

    fn responses_body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut content = vec![json!({"type": "input_text", "text": request.prompt})];
        for attachment in &request.attachments {
            match attachment {
                Attachment::Image {
                    media_type,
                    data_base64,
                } => content.push(json!({
                    "type": "input_image",
                    "image_url": format!("data:{media_type};base64,{data_base64}")
                })),
                Attachment::File {
                    media_type,
                    data_base64,
                    name,
                } => content.push(json!({
                    "type": "input_file",
                    "filename": name,
                    "file_data": format!("data:{media_type};base64,{data_base64}")
                })),
            }
        }

        let mut body = json!({
            "model": self.model.name,
            "input": [{"role": "user", "content": content}],
        });
        if let Some(system) = &request.system {
            body["instructions"] = json!(system);
        }
        if let Some(max) = request.max_output_tokens {
            body["max_output_tokens"] = json!(max);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, path: &str, body: &Value, request: &GenerateRequest) -> LlmResult<reqwest::Response> {
        let response = self
            .request(path)
            .timeout(request.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(
                &self.provider_label,
                &self.model.to_string(),
                status.as_u16(),
                &body,
            ));
        }
        Ok(response)
    }
}

/// One decoded chat-completions stream frame.
#[derive(Debug, PartialEq)]
enum StreamItem {
    Delta(String),
    Usage(TokenUsage),
    Done,
    Ignore,
}

fn parse_chat_usage(value: &Value) -> TokenUsage {
    TokenUsage {
        prompt: value["prompt_tokens"].as_u64(),
        completion: value["completion_tokens"].as_u64(),
        total: value["total_tokens"].as_u64(),
    }
}

fn parse_chat_response(value: &Value) -> LlmResult<Generated> {
    let text = value["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    Ok(Generated {
        text,
        usage: parse_chat_usage(&value["usage"]),
    })
}

fn parse_chat_stream_data(data: &str) -> StreamItem {
    if data.trim() == "[DONE]" {
        return StreamItem::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return StreamItem::Ignore;
    };
    if let Some(delta) = value["choices"][0]["delta"]["content"].as_str() {
        if !delta.is_empty() {
            return StreamItem::Delta(delta.to_string());
        }
    }
    if value["usage"].is_object() {
        return StreamItem::Usage(parse_chat_usage(&value["usage"]));
    }
    StreamItem::Ignore
}

fn parse_responses_usage(value: &Value) -> TokenUsage {
    TokenUsage {
        prompt: value["input_tokens"].as_u64(),
        completion: value["output_tokens"].as_u64(),
        total: value["total_tokens"].as_u64(),
    }
}

fn parse_responses_response(value: &Value) -> LlmResult<Generated> {
    let mut text = String::new();
    if let Some(outputs) = value["output"].as_array() {
        for output in outputs {
            if output["type"] == "message" {
                if let Some(parts) = output["content"].as_array() {
                    for part in parts {
                        if part["type"] == "output_text" {
                            text.push_str(part["text"].as_str().unwrap_or_default());
                        }
                    }
                }
            }
        }
    }
    Ok(Generated {
        text,
        usage: parse_responses_usage(&value["usage"]),
    })
}

fn parse_responses_stream_data(data: &str) -> StreamItem {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return StreamItem::Ignore;
    };
    match value["type"].as_str() {
        Some("response.output_text.delta") => StreamItem::Delta(
            value["delta"].as_str().unwrap_or_default().to_string(),
        ),
        Some("response.completed") => {
            StreamItem::Usage(parse_responses_usage(&value["response"]["usage"]))
        }
        _ => StreamItem::Ignore,
    }
}

/// Pump an SSE response into a delta channel. Shared by provider clients.
pub(crate) fn spawn_sse_pump(
    response: reqwest::Response,
    parse: impl Fn(&str, Option<&str>) -> StreamPumpItem + Send + 'static,
) -> StreamHandle {
    let (delta_tx, delta_rx) = mpsc::channel(64);
    let (usage_tx, usage_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut parser = SseParser::new();
        let mut usage = TokenUsage::default();
        let mut usage_tx = Some(usage_tx);
        let mut body = response.bytes_stream();

        'pump: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = delta_tx.send(Err(LlmError::from(e))).await;
                    break 'pump;
                }
            };
            let text = String::from_utf8_lossy(&chunk);
            for frame in parser.push(&text) {
                match parse(&frame.data, frame.event.as_deref()) {
                    StreamPumpItem::Delta(delta) => {
                        if delta_tx.send(Ok(delta)).await.is_err() {
                            break 'pump;
                        }
                    }
                    StreamPumpItem::Usage(u) => {
                        usage.prompt = u.prompt.or(usage.prompt);
                        usage.completion = u.completion.or(usage.completion);
                        usage.total = u.total.or(usage.total);
                    }
                    StreamPumpItem::Done => break 'pump,
                    StreamPumpItem::Ignore => {}
                }
            }
        }

        if let Some(tx) = usage_tx.take() {
            let _ = tx.send(usage);
        }
        debug!("LLM stream pump finished");
    });

    StreamHandle {
        deltas: delta_rx,
        usage: usage_rx,
    }
}

/// Provider-neutral stream item for the pump.
pub(crate) enum StreamPumpItem {
    Delta(String),
    Usage(TokenUsage),
    Done,
    Ignore,
}

impl From<StreamItem> for StreamPumpItem {
    fn from(item: StreamItem) -> Self {
        match item {
            StreamItem::Delta(d) => StreamPumpItem::Delta(d),
            StreamItem::Usage(u) => StreamPumpItem::Usage(u),
            StreamItem::Done => StreamPumpItem::Done,
            StreamItem::Ignore => StreamPumpItem::Ignore,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> LlmResult<Generated> {
        if self.use_chat_completions {
            let body = self.chat_body(request, false)?;
            let response = self.send("/chat/completions", &body, request).await?;
            let value: Value = response.json().await?;
            parse_chat_response(&value)
        } else {
            let body = self.responses_body(request, false);
            let response = self.send("/responses", &body, request).await?;
            let value: Value = response.json().await?;
            parse_responses_response(&value)
        }
    }

    async fn stream(&self, request: &GenerateRequest) -> LlmResult<StreamHandle> {
        if self.use_chat_completions {
            let body = self.chat_body(request, true)?;
            let response = self.send("/chat/completions", &body, request).await?;
            Ok(spawn_sse_pump(response, |data, _| {
                parse_chat_stream_data(data).into()
            }))
        } else {
            let body = self.responses_body(request, true);
            let response = self.send("/responses", &body, request).await?;
            Ok(spawn_sse_pump(response, |data, _| {
                parse_responses_stream_data(data).into()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelId {
        ModelId::parse("openai/gpt-4o-mini").unwrap()
    }

    #[test]
    fn test_custom_base_forces_chat_completions() {
        let native = OpenAiClient::new(model(), "k".into());
        assert!(!native.use_chat_completions);

        let custom = OpenAiClient::compatible(
            model(),
            "openai",
            "k".into(),
            Some("https://my-gateway.local/v1".into()),
            false,
        );
        assert!(custom.use_chat_completions);
    }

    #[test]
    fn test_openrouter_gets_identifying_headers() {
        let client = OpenAiClient::openrouter(
            ModelId::parse("openrouter/meta-llama/llama-3.3-70b-instruct:free").unwrap(),
            "k".into(),
        );
        assert!(client.use_chat_completions);
        assert!(client
            .extra_headers
            .iter()
            .any(|(name, _)| *name == "HTTP-Referer"));
        assert!(client.extra_headers.iter().any(|(name, _)| *name == "X-Title"));
    }

    #[test]
    fn test_parse_chat_response() {
        let value = json!({
            "choices": [{"message": {"content": "Summary text"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        });
        let out = parse_chat_response(&value).unwrap();
        assert_eq!(out.text, "Summary text");
        assert_eq!(out.usage.prompt, Some(120));
        assert_eq!(out.usage.completion, Some(40));
    }

    #[test]
    fn test_parse_chat_stream_frames() {
        assert_eq!(parse_chat_stream_data("[DONE]"), StreamItem::Done);
        assert_eq!(
            parse_chat_stream_data(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            StreamItem::Delta("Hi".to_string())
        );
        match parse_chat_stream_data(r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#)
        {
            StreamItem::Usage(u) => {
                assert_eq!(u.prompt, Some(5));
                assert_eq!(u.completion, Some(2));
            }
            other => panic!("expected usage, got {other:?}"),
        }
        assert_eq!(parse_chat_stream_data("not json"), StreamItem::Ignore);
    }

    #[test]
    fn test_parse_responses_response() {
        let value = json!({
            "output": [
                {"type": "reasoning"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Part one. "},
                    {"type": "output_text", "text": "Part two."}
                ]}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 3}
        });
        let out = parse_responses_response(&value).unwrap();
        assert_eq!(out.text, "Part one. Part two.");
        assert_eq!(out.usage.completion, Some(3));
    }

    #[test]
    fn test_parse_responses_stream_frames() {
        assert_eq!(
            parse_responses_stream_data(r#"{"type":"response.output_text.delta","delta":"x"}"#),
            StreamItem::Delta("x".to_string())
        );
        match parse_responses_stream_data(
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":7,"output_tokens":1}}}"#,
        ) {
            StreamItem::Usage(u) => assert_eq!(u.prompt, Some(7)),
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_body_rejects_file_attachments() {
        let client = OpenAiClient::compatible(model(), "openai", "k".into(), Some("https://gw/v1".into()), false);
        let mut request = GenerateRequest::new("prompt");
        request.attachments.push(Attachment::File {
            media_type: "application/pdf".into(),
            data_base64: "AAAA".into(),
            name: "doc.pdf".into(),
        });
        assert!(matches!(
            client.chat_body(&request, false),
            Err(LlmError::AttachmentUnsupported { .. })
        ));
    }
}
