//! Windowed statistics helpers shared by the analyzer, the summary endpoint,
//! and the security snapshot.

/// Arithmetic mean, or None for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Maximum, or None for empty input.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Linear-interpolated percentile over unsorted input.
///
/// With N sorted values and target p in [0, 100], the rank is
/// k = (N-1) * p/100; integral ranks index directly, fractional ranks
/// interpolate between the two neighbors. Empty input yields None.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let k = (sorted.len() - 1) as f64 * (p / 100.0);
    let f = k.floor() as usize;
    let c = (f + 1).min(sorted.len() - 1);
    if f == c {
        return Some(sorted[f]);
    }
    Some(sorted[f] + (sorted[c] - sorted[f]) * (k - f as f64))
}

/// Byte rate between two cumulative counter readings.
///
/// Requires strictly increasing time and a non-decreasing counter; a counter
/// reset (new < old) yields None rather than a negative rate.
pub fn counter_rate(old_bytes: u64, new_bytes: u64, dt_secs: f64) -> Option<f64> {
    if dt_secs <= 0.0 || new_bytes < old_bytes {
        return None;
    }
    Some((new_bytes - old_bytes) as f64 / dt_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty_is_none() {
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }

    #[test]
    fn test_percentile_empty_is_none() {
        assert!(percentile(&[], 50.0).is_none());
        assert!(percentile(&[], 95.0).is_none());
    }

    #[test]
    fn test_percentile_bounds_are_min_and_max() {
        let values = [42.0, 7.0, 19.0, 3.0, 88.0];
        assert_eq!(percentile(&values, 0.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(88.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        // k = 3 * 0.95 = 2.85 over [1,2,3,4]: 3 + (4-3)*0.85
        let values = [1.0, 2.0, 3.0, 4.0];
        let p95 = percentile(&values, 95.0).unwrap();
        assert!((p95 - 3.85).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_integral_rank() {
        // k = 2 * 0.5 = 1.0, exactly the middle element
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 50.0), Some(2.0));
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[5.0], 95.0), Some(5.0));
    }

    #[test]
    fn test_counter_rate() {
        assert_eq!(counter_rate(1000, 2000, 5.0), Some(200.0));
    }

    #[test]
    fn test_counter_rate_reset_is_none() {
        assert!(counter_rate(2000, 1000, 5.0).is_none());
    }

    #[test]
    fn test_counter_rate_zero_dt_is_none() {
        assert!(counter_rate(1000, 2000, 0.0).is_none());
        assert!(counter_rate(1000, 2000, -1.0).is_none());
    }
}
