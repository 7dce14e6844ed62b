//! Phase-weighted extraction progress.
//!
//! Percentages are segmented by phase: prepare ends at 2, fetch at 6,
//! download at 35, detect at 60, extract at 90, refine at 96, OCR at 99,
//! finalize at 100. Reported progress never decreases even if a stage is
//! retried.

use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Fetch,
    Download,
    Detect,
    Extract,
    Refine,
    Ocr,
    Finalize,
}

impl Phase {
    /// Percent span covered by this phase: (start, end).
    fn span(&self) -> (f64, f64) {
        match self {
            Phase::Prepare => (0.0, 2.0),
            Phase::Fetch => (2.0, 6.0),
            Phase::Download => (6.0, 35.0),
            Phase::Detect => (35.0, 60.0),
            Phase::Extract => (60.0, 90.0),
            Phase::Refine => (90.0, 96.0),
            Phase::Ocr => (96.0, 99.0),
            Phase::Finalize => (99.0, 100.0),
        }
    }

    /// Stable label for progress consumers.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Fetch => "fetch",
            Phase::Download => "download",
            Phase::Detect => "detect",
            Phase::Extract => "extract",
            Phase::Refine => "refine",
            Phase::Ocr => "ocr",
            Phase::Finalize => "finalize",
        }
    }
}

/// One progress observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidesProgress {
    pub phase: &'static str,
    pub percent: u8,
    /// Set when this run is waiting on another extraction of the same dir.
    pub queued: bool,
}

/// Monotonic progress tracker.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: AtomicU8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `(phase, fraction)` to an overall percent, clamped monotonic.
    pub fn observe(&self, phase: Phase, fraction: f64) -> SlidesProgress {
        let (start, end) = phase.span();
        let raw = start + (end - start) * fraction.clamp(0.0, 1.0);
        let percent = raw.round().clamp(0.0, 100.0) as u8;

        let clamped = self.last.fetch_max(percent, Ordering::SeqCst).max(percent);
        SlidesProgress {
            phase: phase.label(),
            percent: clamped,
            queued: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_spans_are_contiguous() {
        let phases = [
            Phase::Prepare,
            Phase::Fetch,
            Phase::Download,
            Phase::Detect,
            Phase::Extract,
            Phase::Refine,
            Phase::Ocr,
            Phase::Finalize,
        ];
        let mut prev_end = 0.0;
        for phase in phases {
            let (start, end) = phase.span();
            assert_eq!(start, prev_end, "{:?} must start where the last ended", phase);
            assert!(end > start);
            prev_end = end;
        }
        assert_eq!(prev_end, 100.0);
    }

    #[test]
    fn test_progress_is_monotonic_across_retries() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(Phase::Detect, 1.0).percent, 60);
        // A detect retry reports a lower raw value; observed stays at 60.
        assert_eq!(tracker.observe(Phase::Detect, 0.1).percent, 60);
        assert_eq!(tracker.observe(Phase::Extract, 0.5).percent, 75);
    }

    #[test]
    fn test_fraction_clamped() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(Phase::Extract, 2.0).percent, 90);
    }
}
