use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::contracts::{JudgeStrategy, QualityAssessmentResult, QualityMetric};

struct Entry {
    result: QualityAssessmentResult,
    cached_at: Instant,
}

/// Content-addressed cache keyed on `hash(input_prompt, ai_output,
/// sorted(metrics), strategy)`. Read-many/write-one: stale-but-valid reads
/// within `ttl` are permitted, matching the resource discipline of §5.
/// Fallback results (confidence < 0.2) are never stored (§4.3).
pub struct AssessmentCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl AssessmentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(
        input_prompt: &str,
        ai_output: &str,
        metrics: &[QualityMetric],
        strategy: JudgeStrategy,
    ) -> String {
        let mut sorted = metrics.to_vec();
        sorted.sort();
        let mut hasher = Sha256::new();
        hasher.update(input_prompt.as_bytes());
        hasher.update(b"\0");
        hasher.update(ai_output.as_bytes());
        hasher.update(b"\0");
        for metric in &sorted {
            hasher.update(format!("{metric:?}").as_bytes());
            hasher.update(b",");
        }
        hasher.update(format!("{strategy:?}").as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<QualityAssessmentResult> {
        let entries = self.entries.lock().expect("assessment cache poisoned");
        entries.get(key).and_then(|entry| {
            if entry.cached_at.elapsed() <= self.ttl {
                Some(entry.result.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, key: String, result: QualityAssessmentResult) {
        if result.overall_confidence < 0.2 {
            return;
        }
        let mut entries = self.entries.lock().expect("assessment cache poisoned");
        entries.insert(
            key,
            Entry {
                result,
                cached_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn result(confidence: f64) -> QualityAssessmentResult {
        QualityAssessmentResult {
            scenario_id: uuid::Uuid::new_v4(),
            strategy: JudgeStrategy::SingleJudge,
            model: "m".into(),
            quality_scores: Map::new(),
            per_judge_scores: None,
            overall_score: 0.8,
            overall_confidence: confidence,
            assessed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn key_is_order_independent_over_metrics() {
        let a = AssessmentCache::key(
            "p",
            "o",
            &[QualityMetric::Safety, QualityMetric::Accuracy],
            JudgeStrategy::SingleJudge,
        );
        let b = AssessmentCache::key(
            "p",
            "o",
            &[QualityMetric::Accuracy, QualityMetric::Safety],
            JudgeStrategy::SingleJudge,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_results_are_never_cached() {
        let cache = AssessmentCache::new(Duration::from_secs(60));
        cache.put("k".into(), result(0.1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn cache_hit_returns_equal_value_within_ttl() {
        let cache = AssessmentCache::new(Duration::from_secs(60));
        cache.put("k".into(), result(0.9));
        let hit = cache.get("k").unwrap();
        assert_eq!(hit.overall_score, 0.8);
    }
}
