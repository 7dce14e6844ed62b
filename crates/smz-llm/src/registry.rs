//! Model selection: presets, credentials, base URLs, client construction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smz_models::{ModelId, Provider};

use crate::anthropic::AnthropicClient;
use crate::client::LlmClient;
use crate::error::{LlmError, LlmResult};
use crate::google::GoogleClient;
use crate::openai::OpenAiClient;

const XAI_BASE_URL: &str = "https://api.x.ai/v1";
const ZAI_BASE_URL: &str = "https://api.z.ai/api/paas/v4";

/// Coarse input class a preset rule can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputClass {
    Website,
    Asset,
    Youtube,
    File,
}

/// One preset rule: optional input-class filter plus ordered candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<InputClass>>,
    pub candidates: Vec<String>,
}

impl PresetRule {
    fn matches(&self, class: InputClass) -> bool {
        match &self.when {
            None => true,
            Some(classes) => classes.contains(&class),
        }
    }
}

/// A named selection strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default = "default_mode")]
    pub mode: String,
    pub rules: Vec<PresetRule>,
}

fn default_mode() -> String {
    "auto".to_string()
}

/// Registry inputs from config file and CLI flags.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// User-defined presets (config `models.<name>`), merged over built-ins.
    pub presets: HashMap<String, Preset>,
    /// Default selector (config `model`) when the CLI names none.
    pub default_selector: Option<String>,
    pub cli_openai_base_url: Option<String>,
    pub cli_anthropic_base_url: Option<String>,
    pub config_openai_base_url: Option<String>,
    pub config_anthropic_base_url: Option<String>,
    pub config_openai_use_chat_completions: bool,
}

/// Resolves selectors to candidate models and builds provider clients.
pub struct ModelRegistry {
    config: RegistryConfig,
    env: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

fn builtin_presets() -> HashMap<String, Preset> {
    let mut presets = HashMap::new();
    presets.insert(
        "auto".to_string(),
        Preset {
            mode: "auto".to_string(),
            rules: vec![
                PresetRule {
                    when: Some(vec![InputClass::Asset, InputClass::File]),
                    candidates: vec![
                        "google/gemini-2.5-flash".to_string(),
                        "openai/gpt-4o".to_string(),
                        "anthropic/claude-sonnet-4-0".to_string(),
                    ],
                },
                PresetRule {
                    when: None,
                    candidates: vec![
                        "openai/gpt-4o-mini".to_string(),
                        "anthropic/claude-3-5-haiku-latest".to_string(),
                        "google/gemini-2.0-flash".to_string(),
                        "xai/grok-3-mini".to_string(),
                    ],
                },
            ],
        },
    );
    presets.insert(
        "free".to_string(),
        Preset {
            mode: "auto".to_string(),
            rules: vec![PresetRule {
                when: None,
                candidates: vec![
                    "openrouter/meta-llama/llama-3.3-70b-instruct:free".to_string(),
                    "openrouter/google/gemma-3-27b-it:free".to_string(),
                ],
            }],
        },
    );
    presets
}

impl ModelRegistry {
    pub fn new(
        config: RegistryConfig,
        env: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    ) -> Self {
        Self { config, env }
    }

    fn env(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    /// The selector to use when the CLI names none:
    /// `SUMMARIZE_MODEL` env → config `model` → `auto`.
    pub fn default_selector(&self) -> String {
        self.env("SUMMARIZE_MODEL")
            .or_else(|| self.config.default_selector.clone())
            .unwrap_or_else(|| "auto".to_string())
    }

    /// Look up a preset by name (user-defined wins over built-in).
    pub fn preset(&self, name: &str) -> Option<Preset> {
        self.config
            .presets
            .get(name)
            .cloned()
            .or_else(|| builtin_presets().remove(name))
    }

    /// Resolve a selector into an ordered candidate list.
    ///
    /// A gateway-style id resolves to itself; anything else is a preset whose
    /// first matching rule supplies the candidates.
    pub fn resolve_candidates(
        &self,
        selector: &str,
        class: InputClass,
    ) -> LlmResult<Vec<ModelId>> {
        if ModelId::looks_like_id(selector) {
            let id = ModelId::parse(selector)
                .map_err(|_| LlmError::UnknownPreset(selector.to_string()))?;
            return Ok(vec![id]);
        }

        let preset = self
            .preset(selector)
            .ok_or_else(|| LlmError::UnknownPreset(selector.to_string()))?;

        let rule = preset
            .rules
            .iter()
            .find(|r| r.matches(class))
            .ok_or_else(|| LlmError::UnknownPreset(selector.to_string()))?;

        let candidates: Vec<ModelId> = rule
            .candidates
            .iter()
            .filter_map(|c| ModelId::parse(c).ok())
            .collect();
        if candidates.is_empty() {
            return Err(LlmError::UnknownPreset(selector.to_string()));
        }
        Ok(candidates)
    }

    /// Hint appended when the built-in free preset exhausts its candidates.
    pub fn exhausted_hint(selector: &str) -> Option<&'static str> {
        (selector == "free").then_some("run `summarize refresh-free` to refresh the free model list")
    }

    /// API key for a provider, honoring every accepted env name.
    pub fn api_key(&self, provider: &Provider) -> Option<String> {
        match provider {
            Provider::Google => self
                .env("GEMINI_API_KEY")
                .or_else(|| self.env("GOOGLE_GENERATIVE_AI_API_KEY"))
                .or_else(|| self.env("GOOGLE_API_KEY")),
            other => other.api_key_env().and_then(|name| self.env(name)),
        }
    }

    /// Whether credentials exist for this model's provider.
    pub fn has_credentials(&self, model: &ModelId) -> bool {
        self.api_key(&model.provider).is_some()
    }

    /// OpenAI base URL: CLI flag → `OPENAI_BASE_URL` → config.
    pub fn openai_base_url(&self) -> Option<String> {
        self.config
            .cli_openai_base_url
            .clone()
            .or_else(|| self.env("OPENAI_BASE_URL"))
            .or_else(|| self.config.config_openai_base_url.clone())
    }

    /// Anthropic base URL: CLI flag → `ANTHROPIC_BASE_URL` → config.
    pub fn anthropic_base_url(&self) -> Option<String> {
        self.config
            .cli_anthropic_base_url
            .clone()
            .or_else(|| self.env("ANTHROPIC_BASE_URL"))
            .or_else(|| self.config.config_anthropic_base_url.clone())
    }

    fn openai_use_chat_completions(&self) -> bool {
        if let Some(raw) = self.env("OPENAI_USE_CHAT_COMPLETIONS") {
            return raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        self.config.config_openai_use_chat_completions
    }

    /// Construct the provider client for one model.
    pub fn build_client(&self, model: &ModelId) -> LlmResult<Box<dyn LlmClient>> {
        let provider = model.provider.clone();
        let api_key = self.api_key(&provider).ok_or_else(|| {
            let env = match &provider {
                Provider::Google => "GEMINI_API_KEY",
                other => other.api_key_env().unwrap_or("an API key"),
            };
            LlmError::MissingApiKey {
                provider: provider.to_string(),
                env: env.to_string(),
            }
        })?;

        match provider {
            Provider::Openai => Ok(Box::new(OpenAiClient::compatible(
                model.clone(),
                "openai",
                api_key,
                self.openai_base_url(),
                self.openai_use_chat_completions(),
            ))),
            Provider::Openrouter => Ok(Box::new(OpenAiClient::openrouter(model.clone(), api_key))),
            Provider::Anthropic | Provider::AnthropicCompatible => Ok(Box::new(
                AnthropicClient::new(model.clone(), api_key, self.anthropic_base_url()),
            )),
            Provider::Google => Ok(Box::new(GoogleClient::new(model.clone(), api_key))),
            Provider::Xai => Ok(Box::new(OpenAiClient::compatible(
                model.clone(),
                "xai",
                api_key,
                Some(XAI_BASE_URL.to_string()),
                true,
            ))),
            Provider::Zai => Ok(Box::new(OpenAiClient::compatible(
                model.clone(),
                "zai",
                api_key,
                Some(ZAI_BASE_URL.to_string()),
                true,
            ))),
            Provider::Other(name) => Err(LlmError::UnsupportedProvider(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_env(
        config: RegistryConfig,
        vars: Vec<(&'static str, &'static str)>,
    ) -> ModelRegistry {
        ModelRegistry::new(
            config,
            Arc::new(move |name: &str| {
                vars.iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            }),
        )
    }

    #[test]
    fn test_full_id_resolves_to_itself() {
        let registry = registry_with_env(RegistryConfig::default(), vec![]);
        let candidates = registry
            .resolve_candidates("openai/gpt-4o", InputClass::Website)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].to_string(), "openai/gpt-4o");
    }

    #[test]
    fn test_builtin_auto_rule_matching() {
        let registry = registry_with_env(RegistryConfig::default(), vec![]);
        let for_asset = registry
            .resolve_candidates("auto", InputClass::Asset)
            .unwrap();
        let for_web = registry
            .resolve_candidates("auto", InputClass::Website)
            .unwrap();
        // Assets route to the attachment-capable rule first.
        assert_ne!(for_asset, for_web);
        assert!(for_asset[0].to_string().contains("gemini"));
    }

    #[test]
    fn test_user_preset_wins_over_builtin() {
        let mut config = RegistryConfig::default();
        config.presets.insert(
            "auto".to_string(),
            Preset {
                mode: "auto".to_string(),
                rules: vec![PresetRule {
                    when: None,
                    candidates: vec!["openai/my-favorite".to_string()],
                }],
            },
        );
        let registry = registry_with_env(config, vec![]);
        let candidates = registry
            .resolve_candidates("auto", InputClass::Website)
            .unwrap();
        assert_eq!(candidates[0].name, "my-favorite");
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let registry = registry_with_env(RegistryConfig::default(), vec![]);
        assert!(matches!(
            registry.resolve_candidates("nonsense", InputClass::Website),
            Err(LlmError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_google_key_env_aliases() {
        let registry = registry_with_env(
            RegistryConfig::default(),
            vec![("GOOGLE_API_KEY", "alias-key")],
        );
        assert_eq!(
            registry.api_key(&Provider::Google).as_deref(),
            Some("alias-key")
        );
    }

    #[test]
    fn test_base_url_precedence() {
        let mut config = RegistryConfig::default();
        config.config_openai_base_url = Some("https://from-config/v1".to_string());
        let registry = registry_with_env(
            config.clone(),
            vec![("OPENAI_BASE_URL", "https://from-env/v1")],
        );
        // Env beats config.
        assert_eq!(
            registry.openai_base_url().as_deref(),
            Some("https://from-env/v1")
        );

        // CLI flag beats env.
        config.cli_openai_base_url = Some("https://from-cli/v1".to_string());
        let registry = registry_with_env(
            config,
            vec![("OPENAI_BASE_URL", "https://from-env/v1")],
        );
        assert_eq!(
            registry.openai_base_url().as_deref(),
            Some("https://from-cli/v1")
        );
    }

    #[test]
    fn test_default_selector_precedence() {
        let mut config = RegistryConfig::default();
        config.default_selector = Some("free".to_string());
        let registry = registry_with_env(config.clone(), vec![("SUMMARIZE_MODEL", "openai/gpt-4o")]);
        assert_eq!(registry.default_selector(), "openai/gpt-4o");

        let registry = registry_with_env(config, vec![]);
        assert_eq!(registry.default_selector(), "free");

        let registry = registry_with_env(RegistryConfig::default(), vec![]);
        assert_eq!(registry.default_selector(), "auto");
    }

    #[test]
    fn test_missing_credentials_named_in_error() {
        let registry = registry_with_env(RegistryConfig::default(), vec![]);
        let model = ModelId::parse("openai/gpt-4o").unwrap();
        assert!(!registry.has_credentials(&model));
        match registry.build_client(&model) {
            Err(LlmError::MissingApiKey { env, .. }) => assert_eq!(env, "OPENAI_API_KEY"),
            Err(other) => panic!("expected MissingApiKey, got {other:?}"),
            Ok(_) => panic!("expected MissingApiKey, got a client"),
        }
    }

    #[test]
    fn test_free_hint_only_for_free_preset() {
        assert!(ModelRegistry::exhausted_hint("free").is_some());
        assert!(ModelRegistry::exhausted_hint("auto").is_none());
    }
}
