use crate::contracts::Anomaly;

const MIN_SAMPLES_FOR_ANOMALY_DETECTION: usize = 10;
const ANOMALY_SIGMA_THRESHOLD: f64 = 2.0;

/// Flags points more than 2 standard deviations from the series mean.
/// Requires at least 10 samples (§4.4); anomalies feed quality insights,
/// never alerts directly — escalation is the alert engine's job.
pub fn detect_anomalies(samples: &[f64]) -> Vec<Anomaly> {
    if samples.len() < MIN_SAMPLES_FOR_ANOMALY_DETECTION {
        return Vec::new();
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return Vec::new();
    }
    samples
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            if (value - mean).abs() > ANOMALY_SIGMA_THRESHOLD * std_dev {
                Some(Anomaly {
                    index,
                    value: *value,
                    mean,
                    std_dev,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_ten_samples_yields_no_anomalies() {
        assert!(detect_anomalies(&[1.0, 2.0, 3.0]).is_empty());
    }

    #[test]
    fn an_outlier_is_flagged() {
        let mut samples = vec![1.0; 9];
        samples.push(100.0);
        let anomalies = detect_anomalies(&samples);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 9);
    }

    #[test]
    fn constant_series_has_no_anomalies() {
        let samples = vec![5.0; 12];
        assert!(detect_anomalies(&samples).is_empty());
    }
}
