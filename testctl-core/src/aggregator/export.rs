use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contracts::AggregatedResults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Csv,
    Html,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "csv" => Ok(ExportFormat::Csv),
            "html" => Ok(ExportFormat::Html),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unknown export format: {0}")]
    UnknownFormat(String),
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

pub fn export(results: &AggregatedResults, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(results)?),
        ExportFormat::Markdown => Ok(to_markdown(results)),
        ExportFormat::Csv => Ok(to_csv(results)),
        ExportFormat::Html => Ok(to_html(results)),
    }
}

fn to_markdown(results: &AggregatedResults) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Test Report {}\n\n", results.report_id));
    out.push_str(&format!(
        "Window: {} — {}\n\n",
        results.window_start.to_rfc3339(),
        results.window_end.to_rfc3339()
    ));
    out.push_str("## Overall\n\n");
    out.push_str("| Total | Passed | Failed | Success Rate | Avg Score | Avg Duration (ms) |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {:.1}% | {:.3} | {:.1} |\n\n",
        results.overall.total,
        results.overall.passed,
        results.overall.failed,
        results.overall.success_rate * 100.0,
        results.overall.avg_score,
        results.overall.avg_duration_ms
    ));

    if !results.by_test_type.is_empty() {
        out.push_str("## By Test Type\n\n");
        out.push_str("| Test Type | Total | Passed | Failed | Success Rate |\n");
        out.push_str("|---|---|---|---|---|\n");
        let mut entries: Vec<_> = results.by_test_type.iter().collect();
        entries.sort_by_key(|(test_type, _)| format!("{:?}", test_type));
        for (test_type, summary) in entries {
            out.push_str(&format!(
                "| {:?} | {} | {} | {} | {:.1}% |\n",
                test_type,
                summary.total,
                summary.passed,
                summary.failed,
                summary.success_rate * 100.0
            ));
        }
        out.push('\n');
    }

    if !results.trends.is_empty() {
        out.push_str("## Trends\n\n");
        for trend in &results.trends {
            out.push_str(&format!(
                "- **{}**: {:?} (slope={:.4}, correlation={:.3}, n={})\n",
                trend.metric, trend.direction, trend.slope, trend.correlation, trend.sample_count
            ));
        }
        out.push('\n');
    }

    if !results.quality_insights.is_empty() {
        out.push_str("## Quality Insights\n\n");
        for insight in &results.quality_insights {
            out.push_str(&format!("- **{}** ({:?}): {}\n", insight.title, insight.priority, insight.description));
        }
        out.push('\n');
    }

    if !results.recommendations.is_empty() {
        out.push_str("## Recommendations\n\n");
        for recommendation in &results.recommendations {
            out.push_str(&format!("- {}\n", recommendation));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "_Data completeness: {:.1}%, generated at {}_\n",
        results.data_completeness * 100.0,
        results.generated_at.to_rfc3339()
    ));
    out
}

fn to_csv(results: &AggregatedResults) -> String {
    let mut out = String::new();
    out.push_str("scope,total,passed,failed,success_rate,avg_score,avg_duration_ms\n");
    out.push_str(&csv_row("overall", &results.overall));

    let mut by_test_type: Vec<_> = results.by_test_type.iter().collect();
    by_test_type.sort_by_key(|(test_type, _)| format!("{:?}", test_type));
    for (test_type, summary) in by_test_type {
        out.push_str(&csv_row(&format!("test_type:{:?}", test_type), summary));
    }

    let mut by_service: Vec<_> = results.by_service.iter().collect();
    by_service.sort_by_key(|(service, _)| service.clone());
    for (service, summary) in by_service {
        out.push_str(&csv_row(&format!("service:{}", service), summary));
    }
    out
}

fn csv_row(scope: &str, summary: &crate::contracts::TestSummary) -> String {
    format!(
        "{},{},{},{},{:.4},{:.4},{:.2}\n",
        escape_csv(scope),
        summary.total,
        summary.passed,
        summary.failed,
        summary.success_rate,
        summary.avg_score,
        summary.avg_duration_ms
    )
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_html(results: &AggregatedResults) -> String {
    format!(
        "<html><body><h1>Test Report {}</h1><p>{} total, {} passed, {:.1}% success rate</p></body></html>",
        results.report_id,
        results.overall.total,
        results.overall.passed,
        results.overall.success_rate * 100.0
    )
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::TestSummary;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample() -> AggregatedResults {
        AggregatedResults {
            report_id: Uuid::new_v4(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            overall: TestSummary {
                total: 10,
                passed: 8,
                failed: 2,
                avg_score: 0.85,
                avg_duration_ms: 120.0,
                success_rate: 0.8,
            },
            by_test_type: Default::default(),
            by_service: Default::default(),
            trends: Vec::new(),
            quality_insights: Vec::new(),
            performance_summary: Default::default(),
            top_failures: Vec::new(),
            top_performers: Vec::new(),
            recommendations: Vec::new(),
            data_completeness: 0.95,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn json_export_round_trips() {
        let results = sample();
        let json = export(&results, ExportFormat::Json).unwrap();
        let parsed: AggregatedResults = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.overall.total, results.overall.total);
    }

    #[test]
    fn csv_export_has_header_and_overall_row() {
        let csv = export(&sample(), ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "scope,total,passed,failed,success_rate,avg_score,avg_duration_ms");
        assert!(lines.next().unwrap().starts_with("overall,10,8,2"));
    }

    #[test]
    fn markdown_export_includes_report_id() {
        let results = sample();
        let markdown = export(&results, ExportFormat::Markdown).unwrap();
        assert!(markdown.contains(&results.report_id.to_string()));
    }
}
