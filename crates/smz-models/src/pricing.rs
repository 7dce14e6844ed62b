//! Model pricing tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model_id::ModelId;

/// Per-model token pricing, USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_usd_per_1m: f64,
    pub output_usd_per_1m: f64,
}

/// Pricing lookup for models and flat-rate auxiliary services.
///
/// Model lookup is two-tier: the exact `provider/model` key first, then the
/// provider-less model key. A missing entry yields `None` (no cost, not zero).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable {
    /// `provider/model` or bare `model` → token pricing.
    pub models: HashMap<String, ModelPricing>,
    /// Service name → flat USD per request.
    pub services: HashMap<String, f64>,
}

impl PricingTable {
    /// Look up pricing for a model id.
    pub fn lookup(&self, id: &ModelId) -> Option<ModelPricing> {
        self.models
            .get(&id.to_string())
            .or_else(|| self.models.get(&id.name))
            .copied()
    }

    /// Flat per-request rate for an auxiliary service.
    pub fn service_rate(&self, service: &str) -> Option<f64> {
        self.services.get(service).copied()
    }

    /// The built-in table shipped with the binary.
    pub fn builtin() -> Self {
        let mut models = HashMap::new();
        let mut add = |key: &str, input: f64, output: f64| {
            models.insert(
                key.to_string(),
                ModelPricing {
                    input_usd_per_1m: input,
                    output_usd_per_1m: output,
                },
            );
        };
        add("openai/gpt-4o", 2.50, 10.00);
        add("openai/gpt-4o-mini", 0.15, 0.60);
        add("openai/gpt-4.1", 2.00, 8.00);
        add("openai/gpt-4.1-mini", 0.40, 1.60);
        add("anthropic/claude-3-5-haiku-latest", 0.80, 4.00);
        add("anthropic/claude-sonnet-4-0", 3.00, 15.00);
        add("google/gemini-2.0-flash", 0.10, 0.40);
        add("google/gemini-2.5-flash", 0.30, 2.50);
        add("xai/grok-3-mini", 0.30, 0.50);
        // Provider-less fallbacks for gateway-routed names
        add("gpt-4o-mini", 0.15, 0.60);
        add("gemini-2.0-flash", 0.10, 0.40);

        let mut services = HashMap::new();
        services.insert("firecrawl".to_string(), 0.001);
        services.insert("apify-transcript".to_string(), 0.005);
        services.insert("transcription".to_string(), 0.006);

        Self { models, services }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_key_wins() {
        let table = PricingTable::builtin();
        let id = ModelId::parse("openai/gpt-4o-mini").unwrap();
        let p = table.lookup(&id).unwrap();
        assert!((p.input_usd_per_1m - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_provider_less_fallback() {
        let table = PricingTable::builtin();
        // No `openrouter/gemini-2.0-flash` entry; falls back to the bare name.
        let id = ModelId::parse("openrouter/gemini-2.0-flash").unwrap();
        assert!(table.lookup(&id).is_some());
    }

    #[test]
    fn test_missing_is_none_not_zero() {
        let table = PricingTable::builtin();
        let id = ModelId::parse("acme/unknown-model").unwrap();
        assert!(table.lookup(&id).is_none());
    }
}
