pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    /// Median with the midpoint of the two central values for even lengths.
    pub fn median(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    /// Rounds to `decimals` places, half away from zero.
    pub fn round_to(value: f64, decimals: i32) -> f64 {
        let scale = 10f64.powi(decimals);
        (value * scale).round() / scale
    }

    /// Nearest multiple of `step`, half away from zero.
    pub fn round_to_step(value: i64, step: i64) -> i64 {
        if step <= 0 {
            return value;
        }
        ((value as f64 / step as f64).round() as i64) * step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_has_no_statistics() {
        assert_eq!(StatsHelper::mean(&[]), None);
        assert_eq!(StatsHelper::median(&[]), None);
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(StatsHelper::median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(StatsHelper::median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(StatsHelper::round_to(1.23456, 2), 1.23);
        assert_eq!(StatsHelper::round_to_step(1_099, 200), 1_000);
        assert_eq!(StatsHelper::round_to_step(1_100, 200), 1_200);
    }
}
