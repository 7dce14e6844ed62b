//! Detection segmentation and merge.
//!
//! Scene detection is split into parallel chunks across the worker pool,
//! with no chunk shorter than one minute. Per-segment timestamps come back
//! relative to their segment start and are re-based, merged, and deduped by
//! a minimum gap before selection.

/// Minimum chunk length in seconds.
const MIN_SEGMENT_SECONDS: f64 = 60.0;

/// A detection chunk: `(start, span)` in seconds.
pub type Segment = (f64, f64);

/// Split `duration` into at most `workers` chunks of ≥ one minute.
pub fn plan_segments(duration: f64, workers: u32) -> Vec<Segment> {
    if duration <= 0.0 {
        return Vec::new();
    }
    let by_length = (duration / MIN_SEGMENT_SECONDS).floor() as u32;
    let count = workers.min(by_length.max(1)).max(1);
    let span = duration / count as f64;

    (0..count)
        .map(|i| {
            let start = span * i as f64;
            // Last chunk absorbs float remainder.
            let len = if i == count - 1 {
                duration - start
            } else {
                span
            };
            (start, len)
        })
        .collect()
}

/// Re-base per-segment timestamps, merge, sort, and dedupe.
///
/// The dedupe gap is `max(0.1, min_duration / 2)`: adjacent detections from
/// segment seams collapse to the earliest.
pub fn merge_segment_detections(
    segments: &[(Segment, Vec<f64>)],
    min_duration: f64,
) -> Vec<f64> {
    let mut all: Vec<f64> = segments
        .iter()
        .flat_map(|((start, _), detections)| detections.iter().map(move |t| start + t))
        .collect();
    all.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let gap = (min_duration / 2.0).max(0.1);
    let mut merged: Vec<f64> = Vec::with_capacity(all.len());
    for t in all {
        if merged.last().map(|last| t - last >= gap).unwrap_or(true) {
            merged.push(t);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_short_video_single_segment() {
        let segments = plan_segments(45.0, 8);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0], (0.0, 45.0));
    }

    #[test]
    fn test_plan_respects_minimum_segment_length() {
        // 3 minutes across 8 workers: only 3 chunks fit the 1-minute floor.
        let segments = plan_segments(180.0, 8);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|(_, span)| *span >= MIN_SEGMENT_SECONDS - 1e-9));
    }

    #[test]
    fn test_plan_caps_at_workers() {
        let segments = plan_segments(3600.0, 4);
        assert_eq!(segments.len(), 4);
        let total: f64 = segments.iter().map(|(_, span)| span).sum();
        assert!((total - 3600.0).abs() < 1e-6);
    }

    #[test]
    fn test_plan_segments_are_contiguous() {
        let segments = plan_segments(600.0, 8);
        for w in segments.windows(2) {
            let (start_a, span_a) = w[0];
            let (start_b, _) = w[1];
            assert!((start_a + span_a - start_b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_merge_rebases_and_sorts() {
        let segments = vec![
            ((120.0, 120.0), vec![5.0, 40.0]),
            ((0.0, 120.0), vec![10.0, 90.0]),
        ];
        let merged = merge_segment_detections(&segments, 5.0);
        assert_eq!(merged, vec![10.0, 90.0, 125.0, 160.0]);
    }

    #[test]
    fn test_merge_dedupes_by_half_min_duration() {
        // Two detections 2s apart with min_duration 5 → gap 2.5 → collapse.
        let segments = vec![((0.0, 60.0), vec![10.0, 12.0, 30.0])];
        let merged = merge_segment_detections(&segments, 5.0);
        assert_eq!(merged, vec![10.0, 30.0]);
    }

    #[test]
    fn test_merge_gap_floor() {
        // Tiny min_duration still enforces a 0.1s floor.
        let segments = vec![((0.0, 60.0), vec![1.00, 1.05, 1.20])];
        let merged = merge_segment_detections(&segments, 0.0);
        assert_eq!(merged, vec![1.00, 1.20]);
    }
}
