use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;

use crate::contracts::{ActionKind, AssertionKind, UiAction, UiAssertion};

const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_ASSERTION_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub ok: bool,
    pub detail: Option<String>,
}

impl StepOutcome {
    fn ok() -> Self {
        Self { ok: true, detail: None }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

/// Runs one action. Failure is recorded, never propagated — the caller
/// continues the sequence so later steps still contribute evidence.
pub async fn perform_action(page: &Page, action: &UiAction) -> StepOutcome {
    let timeout = Duration::from_millis(action.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS));
    let result = tokio::time::timeout(timeout, run_action(page, action)).await;
    match result {
        Ok(Ok(())) => StepOutcome::ok(),
        Ok(Err(err)) => StepOutcome::failed(err),
        Err(_) => StepOutcome::failed(format!("{:?} timed out after {}ms", action.kind, timeout.as_millis())),
    }
}

async fn run_action(page: &Page, action: &UiAction) -> Result<(), String> {
    match action.kind {
        ActionKind::Click => {
            let element = find(page, action).await?;
            element.click().await.map_err(stringify)?;
        }
        ActionKind::Type => {
            let element = find(page, action).await?;
            element.click().await.map_err(stringify)?;
            let text = action.value.clone().unwrap_or_default();
            element.type_str(text).await.map_err(stringify)?;
        }
        ActionKind::Select => {
            let selector = selector(action)?;
            let value = action.value.clone().unwrap_or_default();
            let script = format!(
                "(() => {{ const el = document.querySelector({selector:?}); if (!el) return false; el.value = {value:?}; el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()"
            );
            page.evaluate(script.as_str()).await.map_err(stringify)?;
        }
        ActionKind::Hover => {
            let element = find(page, action).await?;
            element.hover().await.map_err(stringify)?;
        }
        ActionKind::Wait => {
            let seconds: f64 = action
                .value
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        ActionKind::Scroll => {
            if let Some(selector) = &action.selector {
                let script = format!(
                    "document.querySelector({selector:?})?.scrollIntoView({{behavior: 'instant', block: 'center'}})"
                );
                page.evaluate(script.as_str()).await.map_err(stringify)?;
            } else {
                let px: f64 = action.value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0.0);
                let script = format!("window.scrollBy(0, {px})");
                page.evaluate(script.as_str()).await.map_err(stringify)?;
            }
        }
        ActionKind::Press => {
            let key = action.value.clone().unwrap_or_default();
            let script = format!(
                "document.activeElement?.dispatchEvent(new KeyboardEvent('keydown', {{ key: {key:?}, bubbles: true }}))"
            );
            page.evaluate(script.as_str()).await.map_err(stringify)?;
        }
    }
    Ok(())
}

pub async fn perform_assertion(page: &Page, assertion: &UiAssertion) -> StepOutcome {
    let timeout = Duration::from_millis(
        assertion.timeout_ms.unwrap_or(DEFAULT_ASSERTION_TIMEOUT_MS),
    );
    let result = tokio::time::timeout(timeout, run_assertion(page, assertion)).await;
    match result {
        Ok(Ok(true)) => StepOutcome::ok(),
        Ok(Ok(false)) => StepOutcome::failed(format!("{:?} assertion did not hold", assertion.kind)),
        Ok(Err(err)) => StepOutcome::failed(err),
        Err(_) => StepOutcome::failed(format!("{:?} assertion timed out", assertion.kind)),
    }
}

async fn run_assertion(page: &Page, assertion: &UiAssertion) -> Result<bool, String> {
    match assertion.kind {
        AssertionKind::Visible | AssertionKind::Hidden => {
            let selector = assertion.selector.clone().ok_or("assertion requires a selector")?;
            let found = page.find_element(selector.as_str()).await.is_ok();
            Ok(if assertion.kind == AssertionKind::Visible {
                found
            } else {
                !found
            })
        }
        AssertionKind::Text => {
            let selector = assertion.selector.clone().ok_or("assertion requires a selector")?;
            let element = page.find_element(selector.as_str()).await.map_err(stringify)?;
            let text = element
                .inner_text()
                .await
                .map_err(stringify)?
                .unwrap_or_default();
            let expected = assertion.expected_value.clone().unwrap_or_default();
            Ok(text.contains(&expected))
        }
        AssertionKind::Value => {
            let selector = assertion.selector.clone().ok_or("assertion requires a selector")?;
            let script = format!(
                "document.querySelector({selector:?})?.value ?? null"
            );
            let actual = page
                .evaluate(script.as_str())
                .await
                .map_err(stringify)?
                .into_value::<Option<String>>()
                .map_err(stringify)?
                .unwrap_or_default();
            Ok(Some(actual) == assertion.expected_value)
        }
        AssertionKind::Count => {
            let selector = assertion.selector.clone().ok_or("assertion requires a selector")?;
            let script = format!("document.querySelectorAll({selector:?}).length");
            let count = page
                .evaluate(script.as_str())
                .await
                .map_err(stringify)?
                .into_value::<i64>()
                .map_err(stringify)?;
            let expected: i64 = assertion
                .expected_value
                .as_deref()
                .and_then(|v| v.parse().ok())
                .ok_or("count assertion requires a numeric expected_value")?;
            Ok(count == expected)
        }
        AssertionKind::Url => {
            let url = page.url().await.map_err(stringify)?.unwrap_or_default();
            let expected = assertion.expected_value.clone().unwrap_or_default();
            Ok(url.contains(&expected))
        }
        AssertionKind::Title => {
            let title = page.get_title().await.map_err(stringify)?.unwrap_or_default();
            let expected = assertion.expected_value.clone().unwrap_or_default();
            Ok(title.contains(&expected))
        }
    }
}

async fn find(page: &Page, action: &UiAction) -> Result<Element, String> {
    let selector = selector(action)?;
    page.find_element(selector).await.map_err(stringify)
}

fn selector(action: &UiAction) -> Result<&str, String> {
    action.selector.as_deref().ok_or_else(|| "action requires a selector".to_string())
}

fn stringify<E: std::fmt::Display>(err: E) -> String {
    err.to_string()
}
