/// Linear-interpolation percentile over `samples`, which need not be sorted.
/// `p` is in `[0,100]`. Ties at an integral rank resolve to the lower index,
/// matching the deterministic tie-break used across the platform.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_of_ten_ascending_values() {
        let samples: Vec<f64> = (1..=10).map(|n| n as f64).collect();
        let p95 = percentile(&samples, 95.0);
        assert!((p95 - 9.55).abs() < 1e-9);
    }

    #[test]
    fn integral_rank_takes_lower_index() {
        let samples = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&samples, 50.0), 30.0);
    }

    #[test]
    fn empty_samples_yield_zero() {
        assert_eq!(percentile(&[], 95.0), 0.0);
    }
}
