//! The provider-agnostic client capability.

use std::time::Duration;

use async_trait::async_trait;
use smz_models::{ModelId, TokenUsage};
use tokio::sync::{mpsc, oneshot};

use crate::error::LlmResult;

/// A non-text part of the user message.
///
/// Modeled as a tagged sum with an explicit media type; providers that
/// cannot take a given attachment reject it with a rewritten error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image {
        media_type: String,
        data_base64: String,
    },
    File {
        media_type: String,
        data_base64: String,
        name: String,
    },
}

impl Attachment {
    pub fn media_type(&self) -> &str {
        match self {
            Attachment::Image { media_type, .. } => media_type,
            Attachment::File { media_type, .. } => media_type,
        }
    }
}

/// One generate/stream request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
    pub attachments: Vec<Attachment>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_output_tokens: None,
            timeout: Duration::from_secs(120),
            attachments: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    pub usage: TokenUsage,
}

/// A live stream: raw deltas plus a usage future resolved at end of stream.
///
/// The delta channel closes on `done` or error; an error is delivered as the
/// final item.
pub struct StreamHandle {
    pub deltas: mpsc::Receiver<LlmResult<String>>,
    pub usage: oneshot::Receiver<TokenUsage>,
}

/// The capability every provider variant exposes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// The model this client was constructed for.
    fn model(&self) -> &ModelId;

    /// One-shot generation.
    async fn generate(&self, request: &GenerateRequest) -> LlmResult<Generated>;

    /// Streaming generation.
    async fn stream(&self, request: &GenerateRequest) -> LlmResult<StreamHandle>;
}
