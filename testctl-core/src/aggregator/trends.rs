use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::contracts::{TrendAnalysis, TrendDirection};

/// Coefficient of variation above which a series is considered volatile
/// regardless of its regression direction (§4.4).
const VOLATILITY_THRESHOLD: f64 = 0.5;
/// |r| below which direction is considered STABLE rather than trending.
const WEAK_CORRELATION_THRESHOLD: f64 = 0.3;

/// Groups `samples` by calendar day, takes daily means, and regresses
/// those means against a day index to get a slope and Pearson
/// correlation. `higher_is_better` flips the improving/declining mapping
/// for "lower is better" metrics like duration (§4.4). Returns `None`
/// when fewer than `min_samples` points are available.
pub fn compute_trend(
    metric: &str,
    samples: &[(DateTime<Utc>, f64)],
    higher_is_better: bool,
    min_samples: usize,
) -> Option<TrendAnalysis> {
    if samples.len() < min_samples {
        return None;
    }

    let mean = samples.iter().map(|(_, v)| v).sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    let std_dev = variance.sqrt();
    let coefficient_of_variation = if mean.abs() > 1e-9 {
        std_dev / mean.abs()
    } else {
        0.0
    };

    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (timestamp, value) in samples {
        by_day.entry(timestamp.date_naive()).or_default().push(*value);
    }
    let daily_points: Vec<(f64, f64)> = by_day
        .values()
        .enumerate()
        .map(|(index, values)| {
            (index as f64, values.iter().sum::<f64>() / values.len() as f64)
        })
        .collect();

    let (slope, correlation) = linear_regression(&daily_points);

    let direction = if coefficient_of_variation > VOLATILITY_THRESHOLD {
        TrendDirection::Volatile
    } else if correlation.abs() < WEAK_CORRELATION_THRESHOLD {
        TrendDirection::Stable
    } else {
        let improving = (slope > 0.0) == higher_is_better;
        if improving {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        }
    };

    Some(TrendAnalysis {
        metric: metric.to_string(),
        direction,
        slope,
        correlation,
        confidence: correlation.abs().min(1.0),
        sample_count: samples.len(),
    })
}

/// Ordinary least squares slope and Pearson correlation over `points`.
/// Returns `(0.0, 0.0)` for degenerate inputs (fewer than two points, or
/// zero variance on either axis) — a flat series is STABLE, not an error.
fn linear_regression(points: &[(f64, f64)]) -> (f64, f64) {
    if points.len() < 2 {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in points {
        covariance += (x - mean_x) * (y - mean_y);
        variance_x += (x - mean_x).powi(2);
        variance_y += (y - mean_y).powi(2);
    }

    let slope = if variance_x > 0.0 {
        covariance / variance_x
    } else {
        0.0
    };
    let correlation = if variance_x > 0.0 && variance_y > 0.0 {
        covariance / (variance_x.sqrt() * variance_y.sqrt())
    } else {
        0.0
    };
    (slope, correlation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let start = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::days(i as i64), *v))
            .collect()
    }

    #[test]
    fn insufficient_samples_yields_none() {
        let samples = series(&[0.5, 0.6]);
        assert!(compute_trend("score", &samples, true, 5).is_none());
    }

    #[test]
    fn rising_score_series_is_improving() {
        let samples = series(&[0.5, 0.55, 0.6, 0.65, 0.7, 0.75]);
        let trend = compute_trend("score", &samples, true, 5).unwrap();
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn rising_duration_series_is_declining() {
        let samples = series(&[100.0, 120.0, 140.0, 160.0, 180.0, 200.0]);
        let trend = compute_trend("duration_ms", &samples, false, 5).unwrap();
        assert_eq!(trend.direction, TrendDirection::Declining);
    }

    #[test]
    fn flat_series_is_stable() {
        let samples = series(&[0.8, 0.8, 0.8, 0.8, 0.8, 0.8]);
        let trend = compute_trend("score", &samples, true, 5).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn highly_variable_series_is_volatile() {
        let samples = series(&[0.1, 0.9, 0.1, 0.9, 0.1, 0.9]);
        let trend = compute_trend("score", &samples, true, 5).unwrap();
        assert_eq!(trend.direction, TrendDirection::Volatile);
    }
}
