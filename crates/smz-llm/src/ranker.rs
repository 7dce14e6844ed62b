//! Free-model discovery and ranking for OpenRouter.
//!
//! Filters the catalog to `:free` models that are big and fresh enough,
//! probes each candidate, and ranks by probe success then latency. On a
//! rate-limit error a probe sleeps at least 60 seconds and retries exactly
//! once. Persisting the ranking into `models.free.rules[0].candidates` is
//! the caller's job.

use std::time::{Duration, Instant};

use serde_json::Value;
use smz_models::ModelId;
use tracing::{debug, info, warn};

use crate::client::{GenerateRequest, LlmClient};
use crate::error::{LlmError, LlmResult};
use crate::openai::OpenAiClient;

/// Max candidates probed per refresh.
const MAX_CANDIDATES: usize = 10;

/// Minimum backoff after a rate-limit error.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

const PROBE_PROMPT: &str = "Reply with the single word: ready";
const PROBE_TIMEOUT: Duration = Duration::from_secs(45);

/// Ranker options (CLI flags of `refresh-free`).
#[derive(Debug, Clone)]
pub struct RankOptions {
    /// Extra probe runs per model (total probes = 1 + runs).
    pub runs: u32,
    /// Parameter floor in billions, estimated from the model name.
    pub min_params_b: f64,
    /// Catalog age cutoff in days; 0 disables the filter.
    pub max_age_days: u32,
    pub verbose: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            runs: 1,
            min_params_b: 27.0,
            max_age_days: 180,
            verbose: false,
        }
    }
}

/// One catalog entry that survived the `:free` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeModelCandidate {
    /// OpenRouter-native id (e.g. `meta-llama/llama-3.3-70b-instruct:free`).
    pub id: String,
    /// Unix seconds the model was listed.
    pub created: i64,
    /// Estimated parameter count in billions, from the name.
    pub params_b: Option<f64>,
}

/// Parse an OpenRouter catalog response into free-model candidates.
pub fn parse_catalog(catalog: &Value) -> Vec<FreeModelCandidate> {
    let Some(entries) = catalog["data"].as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry["id"].as_str()?;
            if !id.ends_with(":free") {
                return None;
            }
            Some(FreeModelCandidate {
                id: id.to_string(),
                created: entry["created"].as_i64().unwrap_or(0),
                params_b: estimate_params_b(id),
            })
        })
        .collect()
}

/// Estimate parameter count in billions from tokens like `70b`, `8x7b`,
/// `27b-it` in the model name.
pub fn estimate_params_b(name: &str) -> Option<f64> {
    let lowered = name.to_lowercase();
    let mut best: Option<f64> = None;

    for token in lowered.split(|c: char| !c.is_ascii_alphanumeric() && c != '.') {
        let Some(stripped) = token.strip_suffix('b') else {
            continue;
        };
        // Mixture notation: 8x7b → 56.
        let value = if let Some((experts, size)) = stripped.split_once('x') {
            match (experts.parse::<f64>(), size.parse::<f64>()) {
                (Ok(e), Ok(s)) => Some(e * s),
                _ => None,
            }
        } else {
            stripped.parse::<f64>().ok()
        };
        if let Some(v) = value {
            if v > 0.0 && v < 10_000.0 && best.map(|b| v > b).unwrap_or(true) {
                best = Some(v);
            }
        }
    }
    best
}

/// Apply parameter, age, and count filters.
pub fn filter_candidates(
    candidates: Vec<FreeModelCandidate>,
    options: &RankOptions,
    now_unix: i64,
) -> Vec<FreeModelCandidate> {
    let cutoff = (options.max_age_days > 0)
        .then(|| now_unix - options.max_age_days as i64 * 24 * 3600);

    let mut kept: Vec<FreeModelCandidate> = candidates
        .into_iter()
        .filter(|c| {
            c.params_b.map(|p| p >= options.min_params_b).unwrap_or(false)
        })
        .filter(|c| cutoff.map(|cut| c.created >= cut).unwrap_or(true))
        .collect();

    // Prefer newest before the probe cap.
    kept.sort_by_key(|c| std::cmp::Reverse(c.created));
    kept.truncate(MAX_CANDIDATES);
    kept
}

/// Fetch the OpenRouter catalog.
pub async fn fetch_catalog(http: &reqwest::Client) -> LlmResult<Value> {
    let response = http
        .get(format!("{}/models", crate::openai::OPENROUTER_BASE_URL))
        .timeout(Duration::from_secs(30))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::from_status(
            "openrouter",
            "openrouter/models",
            status.as_u16(),
            &body,
        ));
    }
    Ok(response.json().await?)
}

#[derive(Debug)]
struct ProbeScore {
    id: String,
    successes: u32,
    total_latency: Duration,
}

/// Probe one candidate once, with the rate-limit backoff-and-retry rule.
async fn probe_once(client: &OpenAiClient, options: &RankOptions) -> LlmResult<Duration> {
    let request = GenerateRequest::new(PROBE_PROMPT)
        .with_max_output_tokens(16)
        .with_timeout(PROBE_TIMEOUT);

    let started = Instant::now();
    match client.generate(&request).await {
        Ok(out) if !out.text.trim().is_empty() => Ok(started.elapsed()),
        Ok(_) => Err(LlmError::EmptyOutput),
        Err(LlmError::RateLimited { message }) => {
            if options.verbose {
                info!(backoff_secs = RATE_LIMIT_BACKOFF.as_secs(), %message, "Rate limited, backing off");
            }
            tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
            let retry_started = Instant::now();
            let out = client.generate(&request).await?;
            if out.text.trim().is_empty() {
                return Err(LlmError::EmptyOutput);
            }
            Ok(retry_started.elapsed())
        }
        Err(e) => Err(e),
    }
}

/// Rank the filtered candidates by probing each `1 + runs` times.
///
/// Returns gateway-style ids ordered best-first, ready to persist under
/// `models.free.rules[0].candidates`.
pub async fn rank_free_models(
    api_key: &str,
    candidates: &[FreeModelCandidate],
    options: &RankOptions,
) -> LlmResult<Vec<String>> {
    let probes = 1 + options.runs;
    let mut scores: Vec<ProbeScore> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let gateway_id = format!("openrouter/{}", candidate.id);
        let Ok(model) = ModelId::parse(&gateway_id) else {
            continue;
        };
        let client = OpenAiClient::openrouter(model, api_key.to_string());

        let mut score = ProbeScore {
            id: gateway_id.clone(),
            successes: 0,
            total_latency: Duration::ZERO,
        };
        for attempt in 0..probes {
            match probe_once(&client, options).await {
                Ok(latency) => {
                    score.successes += 1;
                    score.total_latency += latency;
                    if options.verbose {
                        info!(model = %gateway_id, attempt, latency_ms = latency.as_millis() as u64, "Probe succeeded");
                    }
                }
                Err(e) => {
                    if options.verbose {
                        warn!(model = %gateway_id, attempt, error = %e, "Probe failed");
                    } else {
                        debug!(model = %gateway_id, attempt, error = %e, "Probe failed");
                    }
                }
            }
        }
        scores.push(score);
    }

    // Most successes first, then lowest average latency.
    scores.sort_by(|a, b| {
        b.successes.cmp(&a.successes).then_with(|| {
            let avg_a = checked_avg(a);
            let avg_b = checked_avg(b);
            avg_a.cmp(&avg_b)
        })
    });

    Ok(scores
        .into_iter()
        .filter(|s| s.successes > 0)
        .map(|s| s.id)
        .collect())
}

fn checked_avg(score: &ProbeScore) -> Duration {
    if score.successes == 0 {
        Duration::MAX
    } else {
        score.total_latency / score.successes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DAY: i64 = 24 * 3600;

    #[test]
    fn test_parse_catalog_keeps_free_only() {
        let catalog = json!({"data": [
            {"id": "meta-llama/llama-3.3-70b-instruct:free", "created": 100},
            {"id": "openai/gpt-4o", "created": 100},
            {"id": "google/gemma-3-27b-it:free", "created": 200}
        ]});
        let candidates = parse_catalog(&catalog);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.id.ends_with(":free")));
    }

    #[test]
    fn test_estimate_params() {
        assert_eq!(
            estimate_params_b("meta-llama/llama-3.3-70b-instruct:free"),
            Some(70.0)
        );
        assert_eq!(estimate_params_b("google/gemma-3-27b-it:free"), Some(27.0));
        assert_eq!(estimate_params_b("mistralai/mixtral-8x7b:free"), Some(56.0));
        assert_eq!(estimate_params_b("some/model-without-size:free"), None);
    }

    #[test]
    fn test_age_filter_default_vs_disabled() {
        let now = 1_000 * DAY;
        let fresh = FreeModelCandidate {
            id: "a/a-70b:free".into(),
            created: now - 10 * DAY,
            params_b: Some(70.0),
        };
        let stale = FreeModelCandidate {
            id: "b/b-70b:free".into(),
            created: now - 200 * DAY,
            params_b: Some(70.0),
        };

        let options = RankOptions::default();
        let kept = filter_candidates(vec![fresh.clone(), stale.clone()], &options, now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, fresh.id);

        let disabled = RankOptions {
            max_age_days: 0,
            ..RankOptions::default()
        };
        let kept = filter_candidates(vec![fresh, stale], &disabled, now);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_param_floor() {
        let now = 1_000 * DAY;
        let small = FreeModelCandidate {
            id: "a/a-8b:free".into(),
            created: now,
            params_b: Some(8.0),
        };
        let unknown = FreeModelCandidate {
            id: "a/a-mystery:free".into(),
            created: now,
            params_b: None,
        };
        let big = FreeModelCandidate {
            id: "a/a-70b:free".into(),
            created: now,
            params_b: Some(70.0),
        };
        let kept = filter_candidates(vec![small, unknown, big], &RankOptions::default(), now);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].id.contains("70b"));
    }

    #[test]
    fn test_candidate_cap() {
        let now = 1_000 * DAY;
        let many: Vec<FreeModelCandidate> = (0i64..20)
            .map(|i| FreeModelCandidate {
                id: format!("v/m{i}-70b:free"),
                created: now - i * DAY,
                params_b: Some(70.0),
            })
            .collect();
        let kept = filter_candidates(many, &RankOptions::default(), now);
        assert_eq!(kept.len(), 10);
        // Newest first.
        assert_eq!(kept[0].id, "v/m0-70b:free");
    }
}
