//! Cost and usage bookkeeping.
//!
//! A run-scoped append-only log of LLM calls plus counters for auxiliary
//! services. Token aggregation preserves null: a summed column is `None` iff
//! no element contributed a real number, so "unknown" never reads as zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model_id::ModelId;
use crate::pricing::PricingTable;

/// Token usage reported by a provider. Any field may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt: Option<u64>,
    pub completion: Option<u64>,
    pub total: Option<u64>,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt: Some(prompt),
            completion: Some(completion),
            total: Some(prompt + completion),
        }
    }
}

/// What an LLM call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallPurpose {
    Summary,
    ChunkNotes,
    Markdown,
    AssetSummary,
}

/// One booked LLM call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    pub model: ModelId,
    pub usage: TokenUsage,
    pub purpose: CallPurpose,
}

/// Null-preserving sum: `None` iff no element contributed a number.
fn sum_opt(acc: Option<u64>, next: Option<u64>) -> Option<u64> {
    match (acc, next) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(a + b),
    }
}

/// One aggregated report row per (provider, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRow {
    pub model: String,
    pub calls: u32,
    pub usage: TokenUsage,
    /// `None` when pricing is unknown; never zero-for-unknown.
    pub cost_usd: Option<f64>,
}

/// The unified cost report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub rows: Vec<CostRow>,
    pub services: BTreeMap<String, u32>,
    /// `None` unless at least one row or service contributed a cost.
    pub total_usd: Option<f64>,
}

/// Run-scoped cost book.
#[derive(Debug, Clone, Default)]
pub struct CostBook {
    calls: Vec<LlmCall>,
    service_hits: BTreeMap<String, u32>,
}

impl CostBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one LLM call.
    pub fn record_call(&mut self, model: ModelId, usage: TokenUsage, purpose: CallPurpose) {
        self.calls.push(LlmCall {
            model,
            usage,
            purpose,
        });
    }

    /// Count one hit against an auxiliary service.
    pub fn record_service(&mut self, service: &str) {
        *self.service_hits.entry(service.to_string()).or_insert(0) += 1;
    }

    pub fn calls(&self) -> &[LlmCall] {
        &self.calls
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.service_hits.is_empty()
    }

    /// Group by model, sum usage null-preservingly, price each row.
    pub fn report(&self, pricing: &PricingTable) -> CostReport {
        let mut grouped: BTreeMap<String, (ModelId, u32, TokenUsage)> = BTreeMap::new();
        for call in &self.calls {
            let entry = grouped
                .entry(call.model.to_string())
                .or_insert_with(|| (call.model.clone(), 0, TokenUsage::default()));
            entry.1 += 1;
            entry.2.prompt = sum_opt(entry.2.prompt, call.usage.prompt);
            entry.2.completion = sum_opt(entry.2.completion, call.usage.completion);
            entry.2.total = sum_opt(entry.2.total, call.usage.total);
        }

        let mut total: Option<f64> = None;
        let mut rows = Vec::with_capacity(grouped.len());
        for (label, (model, calls, usage)) in grouped {
            let cost_usd = pricing.lookup(&model).map(|p| {
                let input = usage.prompt.unwrap_or(0) as f64 / 1e6 * p.input_usd_per_1m;
                let output = usage.completion.unwrap_or(0) as f64 / 1e6 * p.output_usd_per_1m;
                input + output
            });
            if let Some(c) = cost_usd {
                total = Some(total.unwrap_or(0.0) + c);
            }
            rows.push(CostRow {
                model: label,
                calls,
                usage,
                cost_usd,
            });
        }

        for (service, hits) in &self.service_hits {
            if let Some(rate) = pricing.service_rate(service) {
                total = Some(total.unwrap_or(0.0) + rate * *hits as f64);
            }
        }

        CostReport {
            rows,
            services: self.service_hits.clone(),
            total_usd: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(s: &str) -> ModelId {
        ModelId::parse(s).unwrap()
    }

    #[test]
    fn test_null_preserving_aggregation() {
        let mut book = CostBook::new();
        book.record_call(
            model("acme/mystery"),
            TokenUsage::default(),
            CallPurpose::Summary,
        );
        book.record_call(
            model("acme/mystery"),
            TokenUsage {
                prompt: None,
                completion: None,
                total: None,
            },
            CallPurpose::ChunkNotes,
        );

        let report = book.report(&PricingTable::builtin());
        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        // No element contributed a number, so the aggregate stays null.
        assert_eq!(row.usage.prompt, None);
        assert_eq!(row.usage.completion, None);
        assert_eq!(row.cost_usd, None);
        assert_eq!(report.total_usd, None);
    }

    #[test]
    fn test_partial_nulls_keep_known_sum() {
        let mut book = CostBook::new();
        book.record_call(
            model("openai/gpt-4o-mini"),
            TokenUsage::new(1000, 500),
            CallPurpose::Summary,
        );
        book.record_call(
            model("openai/gpt-4o-mini"),
            TokenUsage {
                prompt: None,
                completion: Some(100),
                total: None,
            },
            CallPurpose::ChunkNotes,
        );

        let report = book.report(&PricingTable::builtin());
        let row = &report.rows[0];
        assert_eq!(row.calls, 2);
        assert_eq!(row.usage.prompt, Some(1000));
        assert_eq!(row.usage.completion, Some(600));
        assert!(row.cost_usd.unwrap() > 0.0);
        assert!(report.total_usd.unwrap() > 0.0);
    }

    #[test]
    fn test_groups_by_model() {
        let mut book = CostBook::new();
        book.record_call(
            model("openai/gpt-4o-mini"),
            TokenUsage::new(10, 10),
            CallPurpose::Summary,
        );
        book.record_call(
            model("google/gemini-2.0-flash"),
            TokenUsage::new(10, 10),
            CallPurpose::Markdown,
        );
        let report = book.report(&PricingTable::builtin());
        assert_eq!(report.rows.len(), 2);
    }

    #[test]
    fn test_service_hits_contribute_to_total() {
        let mut book = CostBook::new();
        book.record_service("firecrawl");
        book.record_service("firecrawl");
        let report = book.report(&PricingTable::builtin());
        assert_eq!(report.services.get("firecrawl"), Some(&2));
        assert!((report.total_usd.unwrap() - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_empty_book_reports_null_total() {
        let report = CostBook::new().report(&PricingTable::builtin());
        assert!(report.rows.is_empty());
        assert_eq!(report.total_usd, None);
    }
}
