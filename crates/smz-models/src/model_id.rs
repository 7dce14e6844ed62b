//! Gateway-style model identifiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelIdError {
    #[error("model id has no provider prefix: {0}")]
    MissingProvider(String),
    #[error("model id has an empty model name: {0}")]
    EmptyName(String),
}

/// An LLM provider, as named in the gateway-style id prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Xai,
    Zai,
    Openrouter,
    AnthropicCompatible,
    /// Any other prefix the user supplied; echoed back verbatim.
    #[serde(untagged)]
    Other(String),
}

impl Provider {
    /// Parse a provider prefix. Unknown prefixes are preserved as `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "openai" => Provider::Openai,
            "anthropic" => Provider::Anthropic,
            "google" => Provider::Google,
            "xai" => Provider::Xai,
            "zai" => Provider::Zai,
            "openrouter" => Provider::Openrouter,
            "anthropic-compatible" => Provider::AnthropicCompatible,
            other => Provider::Other(other.to_string()),
        }
    }

    /// The canonical prefix string.
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Xai => "xai",
            Provider::Zai => "zai",
            Provider::Openrouter => "openrouter",
            Provider::AnthropicCompatible => "anthropic-compatible",
            Provider::Other(s) => s,
        }
    }

    /// The environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Openai => Some("OPENAI_API_KEY"),
            Provider::Anthropic | Provider::AnthropicCompatible => Some("ANTHROPIC_API_KEY"),
            Provider::Google => Some("GEMINI_API_KEY"),
            Provider::Xai => Some("XAI_API_KEY"),
            Provider::Zai => Some("ZAI_API_KEY"),
            Provider::Openrouter => Some("OPENROUTER_API_KEY"),
            Provider::Other(_) => None,
        }
    }

    /// The environment variable overriding this provider's base URL.
    pub fn base_url_env(&self) -> Option<&'static str> {
        match self {
            Provider::Openai => Some("OPENAI_BASE_URL"),
            Provider::Anthropic | Provider::AnthropicCompatible => Some("ANTHROPIC_BASE_URL"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-qualified model identifier of the form `provider/name`.
///
/// Parsing is purely lexical: the first `/` splits the provider prefix from
/// the provider-native model name, which may itself contain slashes
/// (e.g. `openrouter/meta-llama/llama-3.3-70b-instruct:free`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    pub provider: Provider,
    pub name: String,
}

impl ModelId {
    /// Parse a `provider/name` id.
    pub fn parse(s: &str) -> Result<Self, ModelIdError> {
        let s = s.trim();
        let (prefix, name) = s
            .split_once('/')
            .ok_or_else(|| ModelIdError::MissingProvider(s.to_string()))?;
        if prefix.is_empty() {
            return Err(ModelIdError::MissingProvider(s.to_string()));
        }
        if name.is_empty() {
            return Err(ModelIdError::EmptyName(s.to_string()));
        }
        Ok(Self {
            provider: Provider::parse(prefix),
            name: name.to_string(),
        })
    }

    /// Whether the input looks like a gateway-style id at all.
    ///
    /// Anything without a `/` is treated as a preset name by the registry.
    pub fn looks_like_id(s: &str) -> bool {
        s.contains('/')
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}

impl TryFrom<String> for ModelId {
    type Error = ModelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModelId::parse(&value)
    }
}

impl From<ModelId> for String {
    fn from(value: ModelId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_provider() {
        let id = ModelId::parse("openai/gpt-4o-mini").unwrap();
        assert_eq!(id.provider, Provider::Openai);
        assert_eq!(id.name, "gpt-4o-mini");
        assert_eq!(id.to_string(), "openai/gpt-4o-mini");
    }

    #[test]
    fn test_parse_name_with_slashes() {
        let id = ModelId::parse("openrouter/meta-llama/llama-3.3-70b-instruct:free").unwrap();
        assert_eq!(id.provider, Provider::Openrouter);
        assert_eq!(id.name, "meta-llama/llama-3.3-70b-instruct:free");
    }

    #[test]
    fn test_unknown_provider_echoes_back() {
        let id = ModelId::parse("acme/secret-model").unwrap();
        assert_eq!(id.provider, Provider::Other("acme".to_string()));
        assert_eq!(id.to_string(), "acme/secret-model");
    }

    #[test]
    fn test_missing_provider() {
        assert_eq!(
            ModelId::parse("gpt-4o"),
            Err(ModelIdError::MissingProvider("gpt-4o".to_string()))
        );
        assert!(!ModelId::looks_like_id("free"));
        assert!(ModelId::looks_like_id("openai/gpt-4o"));
    }

    #[test]
    fn test_empty_parts() {
        assert!(matches!(
            ModelId::parse("/gpt-4o"),
            Err(ModelIdError::MissingProvider(_))
        ));
        assert!(matches!(
            ModelId::parse("openai/"),
            Err(ModelIdError::EmptyName(_))
        ));
    }
}
