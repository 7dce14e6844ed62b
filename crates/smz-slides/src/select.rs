//! Slide timestamp selection.
//!
//! Detected scene changes are merged with a uniform-interval fallback grid,
//! so sparse detection still yields a usable deck and dense detection is
//! bounded. Selected picks respect the minimum spacing and the slide cap.

/// Number of uniform grid points for a given duration.
pub fn grid_count(duration: f64, max_slides: u32) -> u32 {
    let by_duration = (duration / 120.0).round() as u32;
    max_slides.min(by_duration.max(3))
}

/// Build the uniform fallback grid, snapping to nearby detections.
///
/// Each grid point moves to the nearest detected timestamp within
/// `±clamp(interval · 0.35, 2, 10)` seconds when detections exist.
pub fn uniform_grid(detected: &[f64], duration: f64, max_slides: u32) -> Vec<f64> {
    let count = grid_count(duration, max_slides);
    if count == 0 || duration <= 0.0 {
        return Vec::new();
    }
    let interval = duration / (count + 1) as f64;
    let snap_window = (interval * 0.35).clamp(2.0, 10.0);

    (1..=count)
        .map(|i| {
            let point = interval * i as f64;
            if detected.is_empty() {
                return point;
            }
            let nearest = detected
                .iter()
                .copied()
                .min_by(|a, b| {
                    (a - point)
                        .abs()
                        .partial_cmp(&(b - point).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("detected is non-empty");
            if (nearest - point).abs() <= snap_window {
                nearest
            } else {
                point
            }
        })
        .collect()
}

/// Merge detections with the fallback grid, then enforce spacing and cap.
///
/// Earliest picks win both the spacing filter and the cap trim.
pub fn select_timestamps(
    detected: &[f64],
    duration: f64,
    min_duration: f64,
    max_slides: u32,
) -> Vec<f64> {
    let grid = uniform_grid(detected, duration, max_slides);

    let mut candidates: Vec<f64> = detected
        .iter()
        .chain(grid.iter())
        .copied()
        .filter(|t| *t >= 0.0 && *t < duration)
        .collect();
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut picks: Vec<f64> = Vec::new();
    for t in candidates {
        if picks
            .last()
            .map(|last| t - last >= min_duration)
            .unwrap_or(true)
        {
            picks.push(t);
        }
    }

    picks.truncate(max_slides as usize);
    picks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_count_bounds() {
        // 10 minutes → round(600/120) = 5 points.
        assert_eq!(grid_count(600.0, 40), 5);
        // Short video still gets 3 points.
        assert_eq!(grid_count(60.0, 40), 3);
        // Capped by max_slides.
        assert_eq!(grid_count(36_000.0, 10), 10);
    }

    #[test]
    fn test_no_detections_yields_uniform_grid() {
        let picks = select_timestamps(&[], 600.0, 5.0, 40);
        assert_eq!(picks.len(), 5);
        // Evenly spaced at duration / (count + 1).
        assert!((picks[0] - 100.0).abs() < 1e-9);
        assert!((picks[4] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_snaps_to_nearby_detection() {
        // Grid interval 100s → snap window clamps to 10s.
        let detected = vec![95.0];
        let grid = uniform_grid(&detected, 600.0, 40);
        assert!((grid[0] - 95.0).abs() < 1e-9, "100s point snaps to 95s");
        // Far grid points stay put.
        assert!((grid[4] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_snap_window_clamped_low() {
        // Tiny interval: window floor is 2 seconds.
        let detected = vec![10.0, 21.5];
        let grid = uniform_grid(&detected, 80.0, 3);
        // interval = 20, window = clamp(7, 2, 10) = 7; 20s point snaps to 21.5.
        assert!(grid.iter().any(|g| (*g - 21.5).abs() < 1e-9));
    }

    #[test]
    fn test_min_duration_spacing_keeps_earliest() {
        let detected = vec![10.0, 12.0, 14.0, 30.0];
        let picks = select_timestamps(&detected, 60.0, 5.0, 40);
        assert!(picks.contains(&10.0));
        assert!(!picks.contains(&12.0));
        assert!(!picks.contains(&14.0));
        assert!(picks.contains(&30.0));
        for w in picks.windows(2) {
            assert!(w[1] - w[0] >= 5.0);
        }
    }

    #[test]
    fn test_cap_keeps_earliest() {
        let detected: Vec<f64> = (0..100).map(|i| i as f64 * 10.0).collect();
        let picks = select_timestamps(&detected, 1000.0, 5.0, 10);
        assert_eq!(picks.len(), 10);
        assert_eq!(picks[0], 0.0);
        assert_eq!(picks[9], 90.0);
    }

    #[test]
    fn test_out_of_range_candidates_dropped() {
        let picks = select_timestamps(&[-5.0, 650.0], 600.0, 5.0, 40);
        assert!(picks.iter().all(|t| *t >= 0.0 && *t < 600.0));
    }
}
