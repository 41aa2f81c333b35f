use chromiumoxide::page::Page;
use serde::Deserialize;

use super::error::BrowserResult;

const AXE_CDN_SCRIPT: &str = "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.9.1/axe.min.js";

#[derive(Debug, Clone, Deserialize)]
struct AxeResults {
    violations: Vec<serde_json::Value>,
    passes: Vec<serde_json::Value>,
    incomplete: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AccessibilityReport {
    pub violations: Vec<serde_json::Value>,
    pub passes: Vec<serde_json::Value>,
    pub incomplete: Vec<serde_json::Value>,
    pub score: f64,
    pub engine_available: bool,
}

/// Injects axe-core and runs a scan. If the engine cannot be injected or
/// fails, the scan is treated as inconclusive rather than a hard failure:
/// `score = 1.0` with `engine_available = false`.
pub async fn run_scan(page: &Page) -> BrowserResult<AccessibilityReport> {
    let inject = format!(
        "if (!window.axe) {{ const s = document.createElement('script'); s.src = '{AXE_CDN_SCRIPT}'; document.head.appendChild(s); }}"
    );
    if page.evaluate(inject.as_str()).await.is_err() {
        return Ok(unavailable());
    }

    // Give the injected script a moment to load before invoking it.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let has_axe = page
        .evaluate("typeof window.axe !== 'undefined'")
        .await
        .ok()
        .and_then(|result| result.into_value::<bool>().ok())
        .unwrap_or(false);
    if !has_axe {
        return Ok(unavailable());
    }

    let raw = page
        .evaluate("window.axe.run().then(r => JSON.stringify(r))")
        .await
        .ok()
        .and_then(|result| result.into_value::<String>().ok());
    let Some(raw) = raw else {
        return Ok(unavailable());
    };
    let Ok(parsed) = serde_json::from_str::<AxeResults>(&raw) else {
        return Ok(unavailable());
    };

    let passes = parsed.passes.len() as f64;
    let violations = parsed.violations.len() as f64;
    let score = if passes + violations > 0.0 {
        passes / (passes + violations)
    } else {
        1.0
    };

    Ok(AccessibilityReport {
        violations: parsed.violations,
        passes: parsed.passes,
        incomplete: parsed.incomplete,
        score,
        engine_available: true,
    })
}

fn unavailable() -> AccessibilityReport {
    AccessibilityReport {
        violations: Vec::new(),
        passes: Vec::new(),
        incomplete: Vec::new(),
        score: 1.0,
        engine_available: false,
    }
}
