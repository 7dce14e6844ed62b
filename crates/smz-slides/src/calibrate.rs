//! Scene-threshold calibration.
//!
//! Samples evenly spaced frames between 5% and 95% of the duration, hashes
//! them (average hash on 32×32 grayscale) and derives a detection threshold
//! from the distribution of consecutive Hamming-ratio diffs. The final
//! threshold always lands in [0.05, 0.30].

use std::time::Duration;

use smz_media::{frame_hash_at, hamming_ratio, ToolPaths};
use smz_models::AutoTuneInfo;
use tracing::debug;

use crate::error::SlidesResult;

/// Hard bounds on any scene threshold.
pub const THRESHOLD_MIN: f64 = 0.05;
pub const THRESHOLD_MAX: f64 = 0.30;

/// Threshold used when calibration has too little signal.
pub const DEFAULT_THRESHOLD: f64 = 0.10;

/// Evenly spaced sample timestamps between 5% and 95% of `duration`.
pub fn sample_points(duration: f64, samples: u32) -> Vec<f64> {
    let n = samples.clamp(3, 12) as usize;
    let start = duration * 0.05;
    let end = duration * 0.95;
    let step = (end - start) / (n.saturating_sub(1).max(1)) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Derive `(threshold, confidence, strategy)` from consecutive hash diffs.
pub fn choose_threshold(diffs: &[f64]) -> AutoTuneInfo {
    if diffs.len() < 2 {
        return AutoTuneInfo {
            enabled: true,
            chosen_threshold: DEFAULT_THRESHOLD,
            confidence: 0.0,
            strategy: "none".to_string(),
        };
    }

    let mut sorted = diffs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = percentile(&sorted, 0.50);
    let p75 = percentile(&sorted, 0.75);
    let p90 = percentile(&sorted, 0.90);

    let mut base = (median * 0.15).max(p75 * 0.20).max(p90 * 0.25);

    // Very active content: raise the bar so constant motion isn't a scene.
    if p75 >= 0.12 {
        base = base.max(0.12);
    }
    // Very static content: lower the bar so rare slide flips still register.
    if p90 < 0.05 {
        base = base.min(0.08);
    }

    let chosen = base.clamp(THRESHOLD_MIN, THRESHOLD_MAX);
    let confidence = (p75 / 0.25).clamp(0.0, 1.0);

    AutoTuneInfo {
        enabled: true,
        chosen_threshold: chosen,
        confidence,
        strategy: "hash".to_string(),
    }
}

/// Calibrate against a live source.
pub async fn calibrate(
    tools: &ToolPaths,
    input: &str,
    duration: f64,
    samples: u32,
    timeout: Duration,
) -> SlidesResult<AutoTuneInfo> {
    let points = sample_points(duration, samples);

    let mut hashes = Vec::with_capacity(points.len());
    for ts in &points {
        match frame_hash_at(tools, input, *ts, timeout).await {
            Ok(hash) => hashes.push(hash),
            Err(e) => {
                debug!(ts, error = %e, "Calibration sample failed, skipping");
            }
        }
    }

    let diffs: Vec<f64> = hashes
        .windows(2)
        .map(|w| hamming_ratio(&w[0], &w[1]))
        .collect();

    let info = choose_threshold(&diffs);
    debug!(
        samples = hashes.len(),
        threshold = info.chosen_threshold,
        confidence = info.confidence,
        strategy = %info.strategy,
        "Calibrated scene threshold"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_points_window_and_clamp() {
        let points = sample_points(1000.0, 5);
        assert_eq!(points.len(), 5);
        assert!((points[0] - 50.0).abs() < 1e-9);
        assert!((points[4] - 950.0).abs() < 1e-9);

        // Clamped to [3, 12].
        assert_eq!(sample_points(100.0, 1).len(), 3);
        assert_eq!(sample_points(100.0, 50).len(), 12);
    }

    #[test]
    fn test_threshold_in_bounds() {
        for diffs in [
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.5, 0.6, 0.7, 0.8],
            vec![0.01, 0.02, 0.30, 0.01],
        ] {
            let info = choose_threshold(&diffs);
            assert!(info.chosen_threshold >= THRESHOLD_MIN);
            assert!(info.chosen_threshold <= THRESHOLD_MAX);
            assert!(info.confidence >= 0.0 && info.confidence <= 1.0);
        }
    }

    #[test]
    fn test_static_content_lowers_threshold() {
        // Nearly identical frames: p90 < 0.05.
        let info = choose_threshold(&[0.01, 0.02, 0.01, 0.02, 0.01]);
        assert!(info.chosen_threshold <= 0.08);
        assert_eq!(info.strategy, "hash");
    }

    #[test]
    fn test_active_content_raises_threshold() {
        let info = choose_threshold(&[0.15, 0.20, 0.25, 0.18, 0.22]);
        assert!(info.chosen_threshold >= 0.12);
        assert!(info.confidence > 0.5);
    }

    #[test]
    fn test_insufficient_signal_falls_back() {
        let info = choose_threshold(&[0.1]);
        assert_eq!(info.strategy, "none");
        assert!((info.chosen_threshold - DEFAULT_THRESHOLD).abs() < 1e-9);
        assert_eq!(info.confidence, 0.0);
    }
}
