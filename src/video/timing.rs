/// Total frame count for a duration at `fps`.
pub fn frames_for(seconds: f64, fps: u32) -> u32 {
    (seconds.max(0.0) * fps as f64).round() as u32
}

/// Splits `total_seconds` into per-segment frame counts proportional to `weights`.
///
/// Boundaries are rounded cumulatively, so the counts always add up to
/// `frames_for(total_seconds, fps)` and rounding error never accumulates
/// across segments. Non-positive weights count as 1.
pub fn allocate_frames(weights: &[f64], total_seconds: f64, fps: u32) -> Vec<u32> {
    if weights.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = weights
        .iter()
        .map(|w| if *w > 0.0 && w.is_finite() { *w } else { 1.0 })
        .collect();
    let sum: f64 = weights.iter().sum();
    let total = frames_for(total_seconds, fps) as f64;

    let mut frames = Vec::with_capacity(weights.len());
    let mut cumulative = 0.0;
    let mut previous = 0u32;
    for weight in &weights {
        cumulative += weight;
        let boundary = (cumulative / sum * total).round() as u32;
        frames.push(boundary.saturating_sub(previous));
        previous = boundary;
    }
    frames
}

pub fn within_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_sum_to_voiceover_length() {
        let weights = [2.0, 4.5, 8.0, 4.5, 2.0, 4.5, 8.0];
        for seconds in [31.7, 45.0, 58.43, 61.02] {
            let frames = allocate_frames(&weights, seconds, 30);
            assert_eq!(frames.iter().sum::<u32>(), frames_for(seconds, 30));
            assert!(frames.iter().all(|f| *f > 0));
        }
    }

    #[test]
    fn weights_set_the_proportions() {
        let frames = allocate_frames(&[2.0, 8.0], 10.0, 30);
        assert_eq!(frames, vec![60, 240]);
    }

    #[test]
    fn equal_weights_split_evenly() {
        let frames = allocate_frames(&[1.0, 1.0, 1.0], 1.0, 30);
        assert_eq!(frames, vec![10, 10, 10]);
        assert_eq!(allocate_frames(&[0.0, -3.0], 2.0, 30), vec![30, 30]);
    }

    #[test]
    fn tolerance_is_inclusive() {
        assert!(within_tolerance(60.5, 60.0, 0.5));
        assert!(within_tolerance(59.6, 60.0, 0.5));
        assert!(!within_tolerance(60.51, 60.0, 0.5));
    }
}
