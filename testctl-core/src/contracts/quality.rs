use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetric {
    Coherence,
    Creativity,
    Accuracy,
    Safety,
    Relevance,
    Consistency,
}

impl QualityMetric {
    pub const ALL: [QualityMetric; 6] = [
        QualityMetric::Coherence,
        QualityMetric::Creativity,
        QualityMetric::Accuracy,
        QualityMetric::Safety,
        QualityMetric::Relevance,
        QualityMetric::Consistency,
    ];

    /// Default weight per the composite `overall_score` formula; weights
    /// sum to 1.0 and are overridable per request.
    pub fn default_weight(self) -> f64 {
        match self {
            QualityMetric::Safety => 0.25,
            QualityMetric::Accuracy => 0.20,
            QualityMetric::Coherence => 0.15,
            QualityMetric::Relevance => 0.15,
            QualityMetric::Consistency => 0.15,
            QualityMetric::Creativity => 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl QualityScore {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            score: 0.5,
            confidence: 0.1,
            reasoning: reason.into(),
            evidence: Vec::new(),
            suggestions: vec!["Retry assessment".to_string()],
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence < 0.2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeStrategy {
    SingleJudge,
    MultiJudge,
    Ensemble,
    Specialized,
    Comparative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessmentResult {
    pub scenario_id: Uuid,
    pub strategy: JudgeStrategy,
    pub model: String,
    pub quality_scores: HashMap<QualityMetric, QualityScore>,
    /// Populated only for [`JudgeStrategy::MultiJudge`]: every judge's raw
    /// per-metric score, keyed by judge model name. `quality_scores` above
    /// still carries a mean-rolled-up entry per requested metric so the
    /// "every requested metric is present" invariant holds regardless of
    /// strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_judge_scores: Option<HashMap<String, HashMap<QualityMetric, QualityScore>>>,
    pub overall_score: f64,
    pub overall_confidence: f64,
    pub assessed_at: DateTime<Utc>,
}

/// Wire request for the quality judge's `/assess` endpoint (and the
/// orchestrator's AI_QUALITY phase internally). `weights` overrides
/// [`QualityMetric::default_weight`] for the `overall_score` formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessmentRequest {
    pub scenario_id: Uuid,
    pub input_prompt: String,
    pub ai_output: String,
    pub quality_metrics: Vec<QualityMetric>,
    #[serde(default = "default_strategy")]
    pub strategy: JudgeStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<HashMap<QualityMetric, f64>>,
}

fn default_strategy() -> JudgeStrategy {
    JudgeStrategy::SingleJudge
}
