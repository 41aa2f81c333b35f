use crate::contracts::{AlertPriority, QualityInsight, QualityInsightType, QualityMetric};

const RECENT_WINDOW: usize = 10;
const RECENT_CHANGE_THRESHOLD: f64 = 0.1;
const RECENT_CHANGE_HIGH_THRESHOLD: f64 = 0.2;
const MIN_SAMPLES_FOR_PATTERN: usize = 5;
const CONSISTENT_STD_DEV_CEILING: f64 = 0.1;
const CONSISTENT_MEAN_FLOOR: f64 = 0.7;
const VARIABLE_STD_DEV_FLOOR: f64 = 0.2;
const COMPARATIVE_DELTA_THRESHOLD: f64 = 0.05;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Compares the mean of the last 10 samples against the preceding 10
/// (§4.4). A delta below 0.1 is noise; a delta above 0.2 escalates to
/// HIGH priority. `samples` must be in chronological order.
pub fn recent_change(metric: QualityMetric, samples: &[f64]) -> Option<QualityInsight> {
    if samples.len() < RECENT_WINDOW * 2 {
        return None;
    }
    let len = samples.len();
    let recent = &samples[len - RECENT_WINDOW..];
    let preceding = &samples[len - 2 * RECENT_WINDOW..len - RECENT_WINDOW];

    let recent_mean = mean(recent);
    let preceding_mean = mean(preceding);
    let delta = recent_mean - preceding_mean;
    if delta.abs() < RECENT_CHANGE_THRESHOLD {
        return None;
    }

    let improving = delta > 0.0;
    let priority = if delta.abs() > RECENT_CHANGE_HIGH_THRESHOLD {
        AlertPriority::High
    } else {
        AlertPriority::Medium
    };

    Some(QualityInsight {
        insight_type: if improving {
            QualityInsightType::RecentImprovement
        } else {
            QualityInsightType::RecentRegression
        },
        confidence: delta.abs().min(1.0),
        title: format!(
            "{:?} has {} over the last {} assessments",
            metric,
            if improving { "improved" } else { "regressed" },
            RECENT_WINDOW
        ),
        description: format!(
            "Mean {:?} moved from {:.3} to {:.3} ({:+.3}) comparing the preceding {} assessments to the most recent {}.",
            metric, preceding_mean, recent_mean, delta, RECENT_WINDOW, RECENT_WINDOW
        ),
        affected_metrics: vec![metric],
        evidence: vec![
            format!("preceding_mean={:.3}", preceding_mean),
            format!("recent_mean={:.3}", recent_mean),
        ],
        recommendations: if improving {
            Vec::new()
        } else {
            vec![format!("Investigate recent changes affecting {:?}", metric)]
        },
        priority,
    })
}

/// Flags metrics that are either reliably strong (low spread, high mean)
/// or erratic (high spread) over at least 5 samples (§4.4).
pub fn pattern(metric: QualityMetric, samples: &[f64]) -> Option<QualityInsight> {
    if samples.len() < MIN_SAMPLES_FOR_PATTERN {
        return None;
    }
    let mean_value = mean(samples);
    let spread = std_dev(samples, mean_value);

    if spread <= CONSISTENT_STD_DEV_CEILING && mean_value >= CONSISTENT_MEAN_FLOOR {
        return Some(QualityInsight {
            insight_type: QualityInsightType::Pattern,
            confidence: (1.0 - spread / CONSISTENT_STD_DEV_CEILING.max(1e-9)).clamp(0.0, 1.0),
            title: format!("{:?} is consistently strong", metric),
            description: format!(
                "{:?} averaged {:.3} with standard deviation {:.3} across {} samples.",
                metric, mean_value, spread, samples.len()
            ),
            affected_metrics: vec![metric],
            evidence: vec![format!("mean={:.3}", mean_value), format!("std_dev={:.3}", spread)],
            recommendations: Vec::new(),
            priority: AlertPriority::Low,
        });
    }

    if spread > VARIABLE_STD_DEV_FLOOR {
        return Some(QualityInsight {
            insight_type: QualityInsightType::Pattern,
            confidence: (spread / VARIABLE_STD_DEV_FLOOR).min(1.0),
            title: format!("{:?} is variable", metric),
            description: format!(
                "{:?} averaged {:.3} but varied with standard deviation {:.3} across {} samples.",
                metric, mean_value, spread, samples.len()
            ),
            affected_metrics: vec![metric],
            evidence: vec![format!("mean={:.3}", mean_value), format!("std_dev={:.3}", spread)],
            recommendations: vec![format!(
                "Review scenarios with high variance in {:?}",
                metric
            )],
            priority: AlertPriority::Medium,
        });
    }

    None
}

/// Compares a current window against an equally-sized historical window
/// (§4.4). Windows must be non-empty and the same length.
pub fn comparative(
    metric: QualityMetric,
    current: &[f64],
    historical: &[f64],
) -> Option<QualityInsight> {
    if current.is_empty() || historical.is_empty() || current.len() != historical.len() {
        return None;
    }
    let current_mean = mean(current);
    let historical_mean = mean(historical);
    let delta = current_mean - historical_mean;
    if delta.abs() < COMPARATIVE_DELTA_THRESHOLD {
        return None;
    }

    Some(QualityInsight {
        insight_type: QualityInsightType::Comparative,
        confidence: delta.abs().min(1.0),
        title: format!("{:?} differs from its historical baseline", metric),
        description: format!(
            "Current window mean {:.3} vs historical window mean {:.3} ({:+.3}) over {} samples each.",
            current_mean, historical_mean, delta, current.len()
        ),
        affected_metrics: vec![metric],
        evidence: vec![
            format!("current_mean={:.3}", current_mean),
            format!("historical_mean={:.3}", historical_mean),
        ],
        recommendations: if delta < 0.0 {
            vec![format!("Compare recent {:?} scenarios against the historical baseline", metric)]
        } else {
            Vec::new()
        },
        priority: if delta.abs() > RECENT_CHANGE_HIGH_THRESHOLD {
            AlertPriority::High
        } else {
            AlertPriority::Medium
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_needs_twenty_samples() {
        assert!(recent_change(QualityMetric::Safety, &[0.9; 15]).is_none());
    }

    #[test]
    fn clear_regression_is_detected() {
        let mut samples = vec![0.9; 10];
        samples.extend(vec![0.6; 10]);
        let insight = recent_change(QualityMetric::Safety, &samples).unwrap();
        assert_eq!(insight.insight_type, QualityInsightType::RecentRegression);
        assert_eq!(insight.priority, AlertPriority::High);
    }

    #[test]
    fn small_fluctuation_is_not_an_insight() {
        let mut samples = vec![0.80; 10];
        samples.extend(vec![0.82; 10]);
        assert!(recent_change(QualityMetric::Safety, &samples).is_none());
    }

    #[test]
    fn low_spread_high_mean_is_consistent_pattern() {
        let samples = vec![0.9, 0.91, 0.89, 0.9, 0.92];
        let insight = pattern(QualityMetric::Coherence, &samples).unwrap();
        assert_eq!(insight.insight_type, QualityInsightType::Pattern);
        assert_eq!(insight.priority, AlertPriority::Low);
    }

    #[test]
    fn high_spread_is_variable_pattern() {
        let samples = vec![0.1, 0.9, 0.2, 0.8, 0.3];
        let insight = pattern(QualityMetric::Coherence, &samples).unwrap();
        assert_eq!(insight.priority, AlertPriority::Medium);
    }

    #[test]
    fn comparative_requires_equal_length_windows() {
        assert!(comparative(QualityMetric::Accuracy, &[0.5], &[0.5, 0.6]).is_none());
    }

    #[test]
    fn comparative_flags_meaningful_delta() {
        let current = vec![0.5, 0.5, 0.5];
        let historical = vec![0.8, 0.8, 0.8];
        let insight = comparative(QualityMetric::Accuracy, &current, &historical).unwrap();
        assert_eq!(insight.insight_type, QualityInsightType::Comparative);
    }
}
