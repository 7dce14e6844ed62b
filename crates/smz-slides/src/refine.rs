//! Thumbnail refinement.
//!
//! A frame caught mid-fade or on a dark transition makes a useless slide.
//! Dim frames are re-probed at nearby offsets and replaced when a candidate
//! scores visibly better.

use smz_media::FrameStats;

/// How far around the original timestamp to probe, seconds.
pub const FRAME_ADJUST_RANGE: f64 = 10.0;
/// Probe step, seconds.
pub const FRAME_ADJUST_STEP: f64 = 2.0;

/// Required score improvement for a replacement.
const MIN_IMPROVEMENT: f64 = 0.03;
/// Relaxed improvement for the early-first-slide case.
const MIN_IMPROVEMENT_FIRST: f64 = 0.015;

/// Whether a frame qualifies as dim and deserves refinement.
///
/// `early_first_slide` marks the first slide when its timestamp is under 8s,
/// where intros and fade-ins warrant stricter thresholds.
pub fn is_dim(stats: &FrameStats, early_first_slide: bool) -> bool {
    if early_first_slide {
        stats.brightness < 0.58 || stats.contrast < 0.2
    } else {
        stats.brightness < 0.24 || stats.contrast < 0.16
    }
}

/// Candidate probe offsets: ±2, 4, 6, 8, 10 seconds.
pub fn probe_offsets() -> Vec<f64> {
    let mut offsets = Vec::new();
    let mut step = FRAME_ADJUST_STEP;
    while step <= FRAME_ADJUST_RANGE + 1e-9 {
        offsets.push(-step);
        offsets.push(step);
        step += FRAME_ADJUST_STEP;
    }
    offsets
}

/// Candidate score: composite quality penalized by distance from the
/// original timestamp.
pub fn candidate_score(stats: &FrameStats, offset: f64) -> f64 {
    stats.score() - 0.05 * offset.abs() / FRAME_ADJUST_RANGE
}

/// Whether a candidate should replace the original frame.
pub fn accept_candidate(
    original: &FrameStats,
    candidate: &FrameStats,
    offset: f64,
    early_first_slide: bool,
) -> bool {
    let required = if early_first_slide {
        MIN_IMPROVEMENT_FIRST
    } else {
        MIN_IMPROVEMENT
    };
    candidate_score(candidate, offset) - original.score() >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(brightness: f64, contrast: f64) -> FrameStats {
        FrameStats {
            brightness,
            contrast,
        }
    }

    #[test]
    fn test_dim_thresholds() {
        assert!(is_dim(&stats(0.20, 0.5), false));
        assert!(is_dim(&stats(0.5, 0.10), false));
        assert!(!is_dim(&stats(0.30, 0.20), false));

        // Early first slide uses the stricter bar.
        assert!(is_dim(&stats(0.50, 0.5), true));
        assert!(is_dim(&stats(0.7, 0.15), true));
        assert!(!is_dim(&stats(0.60, 0.25), true));
    }

    #[test]
    fn test_probe_offsets() {
        let offsets = probe_offsets();
        assert_eq!(offsets.len(), 10);
        for base in [2.0, 4.0, 6.0, 8.0, 10.0] {
            assert!(offsets.contains(&base));
            assert!(offsets.contains(&-base));
        }
    }

    #[test]
    fn test_distance_penalty() {
        let s = stats(0.5, 0.5);
        assert!(candidate_score(&s, 0.0) > candidate_score(&s, 10.0));
        assert!((candidate_score(&s, 10.0) - (s.score() - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_accept_requires_improvement() {
        let dark = stats(0.10, 0.10);
        let slightly_better = stats(0.12, 0.12);
        let clearly_better = stats(0.5, 0.5);

        assert!(!accept_candidate(&dark, &slightly_better, 2.0, false));
        assert!(accept_candidate(&dark, &clearly_better, 2.0, false));
    }

    #[test]
    fn test_first_slide_accepts_smaller_improvement() {
        let orig = stats(0.40, 0.40);
        // Improvement of ~0.022 after the 2s-offset penalty.
        let cand = stats(0.43, 0.43);
        assert!(!accept_candidate(&orig, &cand, 2.0, false));
        assert!(accept_candidate(&orig, &cand, 2.0, true));
    }
}
