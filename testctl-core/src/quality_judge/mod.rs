//! Multi-dimensional LLM-as-judge scoring with caching and strategies (C5).

mod cache;
mod judge;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use judge::{build_prompt, HttpJudge, Judge, StaticJudge};

use cache::AssessmentCache;
use crate::contracts::{
    AiQualitySpec, ErrorKind, JudgeStrategy, QualityAssessmentRequest, QualityAssessmentResult,
    QualityMetric, QualityScore, TestConfig, TestContext, TestResult, TestScenario,
};

pub const SERVICE_NAME: &str = "quality_judge";

#[derive(Debug, Error)]
pub enum QualityJudgeError {
    #[error("no judges are configured")]
    NoJudgesAvailable,
    #[error("scenario {0} is not an AI quality scenario")]
    NotAQualityScenario(uuid::Uuid),
}

pub struct QualityJudge {
    judges: Vec<Arc<dyn Judge>>,
    cache: AssessmentCache,
}

impl QualityJudge {
    pub fn new(judges: Vec<Arc<dyn Judge>>, cache_ttl_seconds: u64) -> Self {
        Self {
            judges,
            cache: AssessmentCache::new(Duration::from_secs(cache_ttl_seconds)),
        }
    }

    /// Runs an AI_QUALITY scenario end to end, producing a `TestResult`
    /// in the same shape every other executor reports. The output being
    /// assessed is sourced from `context.metadata["ai_output"]`; when the
    /// context carries none (the generating application is an external
    /// collaborator, out of scope per §6) the `input_prompt` itself is
    /// assessed as a passthrough, matching §9's "never destroy signal"
    /// fallback philosophy.
    pub async fn execute_ai_quality_test(
        &self,
        scenario: &TestScenario,
        context: &TestContext,
    ) -> Result<TestResult, QualityJudgeError> {
        let spec = match &scenario.config {
            TestConfig::AiQuality(spec) => spec,
            _ => return Err(QualityJudgeError::NotAQualityScenario(scenario.id)),
        };
        let execution_id = uuid::Uuid::new_v4();
        let ai_output = ai_output_for(spec, context);
        let strategy = if spec.assessment_models.len() > 1 {
            JudgeStrategy::Ensemble
        } else {
            JudgeStrategy::SingleJudge
        };
        let request = QualityAssessmentRequest {
            scenario_id: scenario.id,
            input_prompt: spec.input_prompt.clone(),
            ai_output,
            quality_metrics: spec.quality_metrics.clone(),
            strategy,
            weights: None,
        };
        let started = std::time::Instant::now();
        let assessment = match self.assess_quality(&request, context).await {
            Ok(assessment) => assessment,
            Err(QualityJudgeError::NoJudgesAvailable) => {
                return Ok(TestResult::failure(
                    execution_id,
                    scenario.id,
                    SERVICE_NAME,
                    started.elapsed().as_millis() as u64,
                    ErrorKind::Configuration,
                    "no judges are configured",
                ))
            }
            Err(err) => return Err(err),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let quality_scores: HashMap<QualityMetric, f64> = assessment
            .quality_scores
            .iter()
            .map(|(metric, score)| (*metric, score.score))
            .collect();
        let passed = if scenario.quality_thresholds.is_empty() {
            assessment.overall_score >= 0.7
        } else {
            scenario.quality_thresholds.iter().all(|(metric, threshold)| {
                quality_scores.get(metric).copied().unwrap_or(0.0) >= *threshold
            })
        };
        let recommendations = assessment
            .quality_scores
            .values()
            .flat_map(|score| score.suggestions.clone())
            .collect();

        Ok(TestResult {
            execution_id,
            scenario_id: scenario.id,
            service: SERVICE_NAME.to_string(),
            passed,
            score: assessment.overall_score,
            duration_ms,
            api_results: None,
            ui_results: None,
            ai_quality_results: Some(crate::contracts::AiQualitySubResult {
                overall_score: assessment.overall_score,
                overall_confidence: assessment.overall_confidence,
            }),
            quality_scores,
            performance_metrics: HashMap::new(),
            evidence_paths: Vec::new(),
            error_type: None,
            error_message: None,
            recommendations,
            completed_at: chrono::Utc::now(),
        })
    }

    /// The `/assess` contract operation: scores `request.ai_output`
    /// across `request.quality_metrics` per `request.strategy`.
    pub async fn assess_quality(
        &self,
        request: &QualityAssessmentRequest,
        context: &TestContext,
    ) -> Result<QualityAssessmentResult, QualityJudgeError> {
        if self.judges.is_empty() {
            return Err(QualityJudgeError::NoJudgesAvailable);
        }

        let key = AssessmentCache::key(
            &request.input_prompt,
            &request.ai_output,
            &request.quality_metrics,
            request.strategy,
        );
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let weights = request.weights.clone().unwrap_or_default();
        let result = match request.strategy {
            JudgeStrategy::SingleJudge => {
                self.single_judge(request, context, &weights).await
            }
            JudgeStrategy::MultiJudge => self.multi_judge(request, context, &weights).await,
            JudgeStrategy::Ensemble => self.ensemble(request, context, &weights).await,
            JudgeStrategy::Specialized => self.specialized(request, context, &weights).await,
            JudgeStrategy::Comparative => self.single_judge(request, context, &weights).await,
        };

        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// The `/compare` contract operation: scores every candidate output
    /// independently against the same metric set, for the caller to
    /// compare. Each output is assessed under COMPARATIVE semantics.
    pub async fn compare(
        &self,
        scenario_id: uuid::Uuid,
        input_prompt: &str,
        outputs: &[String],
        metrics: &[QualityMetric],
        context: &TestContext,
    ) -> Result<Vec<f64>, QualityJudgeError> {
        if self.judges.is_empty() {
            return Err(QualityJudgeError::NoJudgesAvailable);
        }
        let mut scores = Vec::with_capacity(outputs.len());
        for output in outputs {
            let request = QualityAssessmentRequest {
                scenario_id,
                input_prompt: input_prompt.to_string(),
                ai_output: output.clone(),
                quality_metrics: metrics.to_vec(),
                strategy: JudgeStrategy::Comparative,
                weights: None,
            };
            let assessment = self.assess_quality(&request, context).await?;
            scores.push(assessment.overall_score);
        }
        Ok(scores)
    }

    async fn single_judge(
        &self,
        request: &QualityAssessmentRequest,
        context: &TestContext,
        weights: &HashMap<QualityMetric, f64>,
    ) -> QualityAssessmentResult {
        let judge = &self.judges[0];
        let mut scores = HashMap::new();
        for metric in &request.quality_metrics {
            let score = judge
                .assess(&request.input_prompt, &request.ai_output, *metric, context)
                .await;
            scores.insert(*metric, score);
        }
        finalize(request, judge.model_name().to_string(), scores, None, weights)
    }

    async fn multi_judge(
        &self,
        request: &QualityAssessmentRequest,
        context: &TestContext,
        weights: &HashMap<QualityMetric, f64>,
    ) -> QualityAssessmentResult {
        let mut per_judge: HashMap<String, HashMap<QualityMetric, QualityScore>> = HashMap::new();
        for judge in &self.judges {
            let mut scores = HashMap::new();
            for metric in &request.quality_metrics {
                let score = judge
                    .assess(&request.input_prompt, &request.ai_output, *metric, context)
                    .await;
                scores.insert(*metric, score);
            }
            per_judge.insert(judge.model_name().to_string(), scores);
        }
        let rolled_up = mean_rollup(&request.quality_metrics, &per_judge);
        finalize(
            request,
            "multi_judge".to_string(),
            rolled_up,
            Some(per_judge),
            weights,
        )
    }

    async fn ensemble(
        &self,
        request: &QualityAssessmentRequest,
        context: &TestContext,
        weights: &HashMap<QualityMetric, f64>,
    ) -> QualityAssessmentResult {
        let mut combined = HashMap::new();
        for metric in &request.quality_metrics {
            let mut per_judge_scores = Vec::with_capacity(self.judges.len());
            for judge in &self.judges {
                let score = judge
                    .assess(&request.input_prompt, &request.ai_output, *metric, context)
                    .await;
                per_judge_scores.push((judge.model_name().to_string(), score));
            }
            combined.insert(*metric, confidence_weighted_average(per_judge_scores));
        }
        let model = self
            .judges
            .iter()
            .map(|judge| judge.model_name())
            .collect::<Vec<_>>()
            .join("+");
        finalize(request, format!("ensemble({model})"), combined, None, weights)
    }

    async fn specialized(
        &self,
        request: &QualityAssessmentRequest,
        context: &TestContext,
        weights: &HashMap<QualityMetric, f64>,
    ) -> QualityAssessmentResult {
        let mut scores = HashMap::new();
        for (index, metric) in request.quality_metrics.iter().enumerate() {
            let judge = &self.judges[index % self.judges.len()];
            let score = judge
                .assess(&request.input_prompt, &request.ai_output, *metric, context)
                .await;
            scores.insert(*metric, score);
        }
        finalize(request, "specialized".to_string(), scores, None, weights)
    }
}

fn ai_output_for(spec: &AiQualitySpec, context: &TestContext) -> String {
    context
        .metadata
        .get("ai_output")
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| spec.input_prompt.clone())
}

/// Combines every judge's score for one metric by confidence-weighted
/// average; reasoning is concatenated and evidence/suggestions unioned
/// (§4.3 ENSEMBLE semantics). Falls back to a uniform average when every
/// weight (confidence) is zero.
fn confidence_weighted_average(scores: Vec<(String, QualityScore)>) -> QualityScore {
    let total_weight: f64 = scores.iter().map(|(_, s)| s.confidence).sum();
    let weighted_score = if total_weight > 0.0 {
        scores.iter().map(|(_, s)| s.score * s.confidence).sum::<f64>() / total_weight
    } else {
        scores.iter().map(|(_, s)| s.score).sum::<f64>() / scores.len().max(1) as f64
    };
    let mean_confidence = scores.iter().map(|(_, s)| s.confidence).sum::<f64>() / scores.len().max(1) as f64;
    let reasoning = scores
        .iter()
        .map(|(model, s)| format!("[{model}] {}", s.reasoning))
        .collect::<Vec<_>>()
        .join(" | ");
    let mut evidence = Vec::new();
    let mut suggestions = Vec::new();
    for (_, score) in &scores {
        for item in &score.evidence {
            if !evidence.contains(item) {
                evidence.push(item.clone());
            }
        }
        for item in &score.suggestions {
            if !suggestions.contains(item) {
                suggestions.push(item.clone());
            }
        }
    }
    QualityScore {
        score: weighted_score.clamp(0.0, 1.0),
        confidence: mean_confidence.clamp(0.0, 1.0),
        reasoning,
        evidence,
        suggestions,
    }
}

fn mean_rollup(
    metrics: &[QualityMetric],
    per_judge: &HashMap<String, HashMap<QualityMetric, QualityScore>>,
) -> HashMap<QualityMetric, QualityScore> {
    let mut rolled = HashMap::new();
    for metric in metrics {
        let scores: Vec<(String, QualityScore)> = per_judge
            .iter()
            .filter_map(|(model, scores)| scores.get(metric).map(|s| (model.clone(), s.clone())))
            .collect();
        if !scores.is_empty() {
            rolled.insert(*metric, confidence_weighted_average(scores));
        }
    }
    rolled
}

/// Every requested metric must appear in the result even if a judge never
/// scored it (§3 invariant); missing entries get a low-confidence
/// fallback rather than being omitted.
fn finalize(
    request: &QualityAssessmentRequest,
    model: String,
    mut scores: HashMap<QualityMetric, QualityScore>,
    per_judge_scores: Option<HashMap<String, HashMap<QualityMetric, QualityScore>>>,
    weights: &HashMap<QualityMetric, f64>,
) -> QualityAssessmentResult {
    for metric in &request.quality_metrics {
        scores
            .entry(*metric)
            .or_insert_with(|| QualityScore::fallback("metric was not scored by any judge"));
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (metric, score) in &scores {
        let weight = weights
            .get(metric)
            .copied()
            .unwrap_or_else(|| metric.default_weight());
        weighted_sum += score.score * weight;
        weight_total += weight;
    }
    let overall_score = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };
    let overall_confidence = if scores.is_empty() {
        0.0
    } else {
        scores.values().map(|s| s.confidence).sum::<f64>() / scores.len() as f64
    };

    QualityAssessmentResult {
        scenario_id: request.scenario_id,
        strategy: request.strategy,
        model,
        quality_scores: scores,
        per_judge_scores,
        overall_score,
        overall_confidence,
        assessed_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Environment;

    fn context() -> TestContext {
        TestContext::new(uuid::Uuid::new_v4(), Environment::Test)
    }

    fn judge(model: &str, score: f64, confidence: f64) -> Arc<dyn Judge> {
        Arc::new(StaticJudge::new(model).with_score(
            QualityMetric::Safety,
            QualityScore {
                score,
                confidence,
                reasoning: format!("{model} says so"),
                evidence: Vec::new(),
                suggestions: Vec::new(),
            },
        ))
    }

    #[tokio::test]
    async fn no_judges_is_a_hard_configuration_error() {
        let qj = QualityJudge::new(Vec::new(), 3600);
        let request = QualityAssessmentRequest {
            scenario_id: uuid::Uuid::new_v4(),
            input_prompt: "p".into(),
            ai_output: "o".into(),
            quality_metrics: vec![QualityMetric::Safety],
            strategy: JudgeStrategy::SingleJudge,
            weights: None,
        };
        let err = qj.assess_quality(&request, &context()).await.unwrap_err();
        assert!(matches!(err, QualityJudgeError::NoJudgesAvailable));
    }

    #[tokio::test]
    async fn ensemble_of_equal_scores_is_confidence_weighted_mean() {
        let qj = QualityJudge::new(vec![judge("a", 0.8, 0.9), judge("b", 0.8, 0.9)], 3600);
        let request = QualityAssessmentRequest {
            scenario_id: uuid::Uuid::new_v4(),
            input_prompt: "p".into(),
            ai_output: "o".into(),
            quality_metrics: vec![QualityMetric::Safety],
            strategy: JudgeStrategy::Ensemble,
            weights: None,
        };
        let result = qj.assess_quality(&request, &context()).await.unwrap();
        assert!((result.quality_scores[&QualityMetric::Safety].score - 0.8).abs() < 1e-9);
        assert!((result.overall_confidence - 0.9).abs() < 1e-9);
        assert!(result.quality_scores[&QualityMetric::Safety]
            .reasoning
            .contains("[a]"));
    }

    #[tokio::test]
    async fn every_requested_metric_is_present_even_if_unscored() {
        let qj = QualityJudge::new(vec![judge("a", 0.8, 0.9)], 3600);
        let request = QualityAssessmentRequest {
            scenario_id: uuid::Uuid::new_v4(),
            input_prompt: "p".into(),
            ai_output: "o".into(),
            quality_metrics: vec![QualityMetric::Safety, QualityMetric::Creativity],
            strategy: JudgeStrategy::SingleJudge,
            weights: None,
        };
        let result = qj.assess_quality(&request, &context()).await.unwrap();
        assert!(result.quality_scores.contains_key(&QualityMetric::Creativity));
        assert!(result.quality_scores[&QualityMetric::Creativity].is_fallback());
    }

    #[tokio::test]
    async fn repeated_request_within_ttl_hits_cache() {
        let qj = QualityJudge::new(vec![judge("a", 0.8, 0.9)], 3600);
        let request = QualityAssessmentRequest {
            scenario_id: uuid::Uuid::new_v4(),
            input_prompt: "p".into(),
            ai_output: "o".into(),
            quality_metrics: vec![QualityMetric::Safety],
            strategy: JudgeStrategy::SingleJudge,
            weights: None,
        };
        let first = qj.assess_quality(&request, &context()).await.unwrap();
        let second = qj.assess_quality(&request, &context()).await.unwrap();
        assert_eq!(first.assessed_at, second.assessed_at);
    }

    #[tokio::test]
    async fn specialized_round_robins_metrics_across_judges() {
        let qj = QualityJudge::new(vec![judge("a", 0.8, 0.9), judge("b", 0.4, 0.9)], 3600);
        let request = QualityAssessmentRequest {
            scenario_id: uuid::Uuid::new_v4(),
            input_prompt: "p".into(),
            ai_output: "o".into(),
            quality_metrics: vec![QualityMetric::Safety],
            strategy: JudgeStrategy::Specialized,
            weights: None,
        };
        let result = qj.assess_quality(&request, &context()).await.unwrap();
        assert!((result.quality_scores[&QualityMetric::Safety].score - 0.8).abs() < 1e-9);
    }
}
