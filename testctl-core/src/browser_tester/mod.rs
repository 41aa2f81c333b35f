//! Owns a pool of browser contexts and runs ordered action/assertion
//! sequences, visual regression, accessibility audits, performance capture
//! and the responsive sub-suite (C4).

mod accessibility;
mod actions;
pub mod error;
mod pool;
pub mod responsive;
mod visual;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub use error::{BrowserError, BrowserResult};
pub use pool::ContextPool;

use crate::contracts::{
    BrowserKind, TestConfig, TestContext, TestResult, TestScenario, UiSubResult,
};

pub const SERVICE_NAME: &str = "browser_tester";

pub struct BrowserTesterConfig {
    pub max_concurrent_contexts: usize,
    pub headless: bool,
    pub screenshots_dir: PathBuf,
    pub response_time_threshold_ms: f64,
}

impl Default for BrowserTesterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_contexts: 10,
            headless: true,
            screenshots_dir: PathBuf::from("evidence/screenshots"),
            response_time_threshold_ms: 3000.0,
        }
    }
}

struct LaunchedBrowser {
    browser: AsyncMutex<Browser>,
}

pub struct BrowserTester {
    config: BrowserTesterConfig,
    pool: ContextPool,
    browsers: AsyncMutex<HashMap<BrowserKind, Arc<LaunchedBrowser>>>,
}

impl BrowserTester {
    pub fn new(config: BrowserTesterConfig) -> Self {
        let pool = ContextPool::new(config.max_concurrent_contexts);
        Self {
            config,
            pool,
            browsers: AsyncMutex::new(HashMap::new()),
        }
    }

    pub async fn execute_ui_test(
        &self,
        scenario: &TestScenario,
        context: &TestContext,
    ) -> BrowserResult<TestResult> {
        let spec = match &scenario.config {
            TestConfig::Ui(spec) => spec.clone(),
            TestConfig::Composite { ui: Some(spec), .. } => spec.clone(),
            _ => return Err(BrowserError::NotAUiScenario(scenario.id)),
        };
        let execution_id = uuid::Uuid::new_v4();
        info!(session_id = %context.session_id, scenario_id = %scenario.id, "starting ui test");

        let permit = match self.pool.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                return Ok(TestResult::failure(
                    execution_id,
                    scenario.id,
                    SERVICE_NAME,
                    0,
                    crate::contracts::ErrorKind::Capacity,
                    err.to_string(),
                ))
            }
        };

        let browser = self.browser_for(spec.browser).await?;
        let guard = browser.browser.lock().await;
        let page = guard
            .new_page(CreateTargetParams::new("about:blank"))
            .await
            .map_err(BrowserError::Cdp)?;
        drop(guard);

        page.execute(
            chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams::builder()
                .width(spec.viewport_size.width as i64)
                .height(spec.viewport_size.height as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await
        .map_err(BrowserError::Cdp)?;

        let started = Instant::now();
        let navigate = NavigateParams::builder()
            .url(spec.page_url.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.goto(navigate).await.map_err(BrowserError::Cdp)?;
        let load_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut action_outcomes = Vec::with_capacity(spec.actions.len());
        for action in &spec.actions {
            action_outcomes.push(actions::perform_action(&page, action).await);
        }
        let mut assertion_outcomes = Vec::with_capacity(spec.assertions.len());
        for assertion in &spec.assertions {
            assertion_outcomes.push(actions::perform_assertion(&page, assertion).await);
        }

        let action_success_rate = success_rate(&action_outcomes);
        let assertion_success_rate = success_rate(&assertion_outcomes);

        let (visual_match, visual_diff_ratio, evidence_paths) = if spec.screenshot_comparison {
            let screenshot = page
                .screenshot(ScreenshotParams::builder().build())
                .await
                .map_err(BrowserError::Cdp)?;
            let key = sanitize_key(&spec.page_url);
            let comparison =
                visual::compare_against_baseline(&self.config.screenshots_dir, &key, &screenshot, spec.visual_threshold)?;
            let mut evidence = vec![self.config.screenshots_dir.join(format!("{key}.png")).to_string_lossy().into_owned()];
            let matched = comparison.diff_ratio.map(|ratio| ratio <= spec.visual_threshold);
            if matched == Some(false) {
                evidence.push(
                    self.config
                        .screenshots_dir
                        .join(format!("{key}.diff.png"))
                        .to_string_lossy()
                        .into_owned(),
                );
            }
            (matched, comparison.diff_ratio, evidence)
        } else {
            (None, None, Vec::new())
        };

        let accessibility_report = if spec.accessibility_standards.is_empty() {
            None
        } else {
            Some(accessibility::run_scan(&page).await?)
        };
        let accessibility_score = accessibility_report.as_ref().map(|r| r.score).unwrap_or(1.0);

        let responsive_score = if spec.responsive_suite {
            Some(responsive::run_suite(&page).await?.aggregate_score)
        } else {
            None
        };

        let _ = page.close().await;

        let load_time_ok = load_time_ms <= self.config.response_time_threshold_ms;
        let mut score_components = vec![
            action_success_rate,
            assertion_success_rate,
            visual_match.map(|m| if m { 1.0 } else { 0.5 }).unwrap_or(1.0),
            accessibility_score,
            if load_time_ok { 1.0 } else { 0.5 },
        ];
        if let Some(responsive_score) = responsive_score {
            score_components.push(responsive_score);
        }
        let overall_score = score_components.iter().sum::<f64>() / score_components.len() as f64;

        let mut recommendations = Vec::new();
        for outcome in action_outcomes.iter().chain(assertion_outcomes.iter()) {
            if let Some(detail) = &outcome.detail {
                recommendations.push(detail.clone());
            }
        }
        if let Some(report) = &accessibility_report {
            if !report.engine_available {
                recommendations.push("accessibility engine unavailable; score defaulted to 1.0".to_string());
            }
        }

        let passed = action_success_rate >= 1.0
            && assertion_success_rate >= 1.0
            && visual_match.unwrap_or(true)
            && load_time_ok;

        let result = TestResult {
            execution_id,
            scenario_id: scenario.id,
            service: SERVICE_NAME.to_string(),
            passed,
            score: overall_score,
            duration_ms: load_time_ms as u64,
            api_results: None,
            ui_results: Some(UiSubResult {
                action_success_rate,
                assertion_success_rate,
                visual_match,
                visual_diff_ratio,
                accessibility_score,
                responsive_score,
                load_time_ms: Some(load_time_ms),
            }),
            ai_quality_results: None,
            quality_scores: HashMap::new(),
            performance_metrics: HashMap::from([("load_time_ms".to_string(), load_time_ms)]),
            evidence_paths,
            error_type: None,
            error_message: None,
            recommendations,
            completed_at: chrono::Utc::now(),
        };
        drop(permit);
        Ok(result)
    }

    /// Navigates a fresh page to `page_url` and writes a PNG screenshot
    /// under `screenshots_dir`, returning the path. Used by the
    /// stand-alone `/screenshot` endpoint, independent of a full UI
    /// test run.
    pub async fn capture_screenshot(&self, page_url: &str, browser_kind: BrowserKind) -> BrowserResult<String> {
        let permit = self.pool.try_acquire()?;
        let browser = self.browser_for(browser_kind).await?;
        let guard = browser.browser.lock().await;
        let page = guard
            .new_page(CreateTargetParams::new("about:blank"))
            .await
            .map_err(BrowserError::Cdp)?;
        drop(guard);

        let navigate = NavigateParams::builder()
            .url(page_url)
            .build()
            .map_err(BrowserError::Configuration)?;
        page.goto(navigate).await.map_err(BrowserError::Cdp)?;
        let screenshot = page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(BrowserError::Cdp)?;
        let _ = page.close().await;
        drop(permit);

        let key = sanitize_key(page_url);
        let path = self.config.screenshots_dir.join(format!("{key}.{}.png", uuid::Uuid::new_v4()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(BrowserError::Io)?;
        }
        std::fs::write(&path, screenshot).map_err(BrowserError::Io)?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn browser_for(&self, kind: BrowserKind) -> BrowserResult<Arc<LaunchedBrowser>> {
        let mut browsers = self.browsers.lock().await;
        if let Some(existing) = browsers.get(&kind) {
            return Ok(Arc::clone(existing));
        }
        let chromium_config = self.build_config(kind)?;
        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "chromium handler reported error");
                }
            }
        });
        info!(?kind, "launched browser instance");
        let launched = Arc::new(LaunchedBrowser {
            browser: AsyncMutex::new(browser),
        });
        browsers.insert(kind, Arc::clone(&launched));
        Ok(launched)
    }

    fn build_config(&self, _kind: BrowserKind) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder().viewport(ChromiumViewport {
            width: 1280,
            height: 800,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder = builder.no_sandbox();
        builder.build().map_err(BrowserError::Configuration)
    }
}

fn success_rate(outcomes: &[actions::StepOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 1.0;
    }
    let ok = outcomes.iter().filter(|o| o.ok).count();
    ok as f64 / outcomes.len() as f64
}

fn sanitize_key(page_url: &str) -> String {
    page_url
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_of_empty_sequence_is_perfect() {
        assert_eq!(success_rate(&[]), 1.0);
    }

    #[test]
    fn success_rate_counts_failures() {
        let outcomes = vec![
            actions::StepOutcome { ok: true, detail: None },
            actions::StepOutcome { ok: false, detail: Some("x".into()) },
        ];
        assert_eq!(success_rate(&outcomes), 0.5);
    }

    #[test]
    fn sanitize_key_strips_non_alphanumeric() {
        assert_eq!(sanitize_key("/foo/bar?x=1"), "_foo_bar_x_1");
    }
}
