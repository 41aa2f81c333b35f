use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::Page;
use serde::Serialize;

use super::error::BrowserResult;

#[derive(Debug, Clone, Copy)]
pub struct ViewportPreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub is_mobile: bool,
}

pub const PRESETS: [ViewportPreset; 7] = [
    ViewportPreset { name: "mobile_portrait", width: 375, height: 667, is_mobile: true },
    ViewportPreset { name: "mobile_landscape", width: 667, height: 375, is_mobile: true },
    ViewportPreset { name: "tablet", width: 768, height: 1024, is_mobile: true },
    ViewportPreset { name: "desktop_small", width: 1280, height: 800, is_mobile: false },
    ViewportPreset { name: "desktop_medium", width: 1440, height: 900, is_mobile: false },
    ViewportPreset { name: "desktop_large", width: 1920, height: 1080, is_mobile: false },
    ViewportPreset { name: "desktop_xl", width: 2560, height: 1440, is_mobile: false },
];

const MIN_TOUCH_TARGET_PX: f64 = 44.0;
const MIN_READABLE_TEXT_PX: f64 = 16.0;

#[derive(Debug, Clone, Serialize)]
pub struct ViewportCheck {
    pub preset: String,
    pub has_horizontal_scroll: bool,
    pub has_viewport_meta: bool,
    pub responsive_image_ratio: f64,
    pub touch_targets_ok: bool,
    pub fixed_width_penalty: bool,
    pub readable_text_ratio: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsiveReport {
    pub checks: Vec<ViewportCheck>,
    pub aggregate_score: f64,
}

pub async fn run_suite(page: &Page) -> BrowserResult<ResponsiveReport> {
    let mut checks = Vec::with_capacity(PRESETS.len());
    for preset in PRESETS {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(preset.width as i64)
            .height(preset.height as i64)
            .device_scale_factor(1.0)
            .mobile(preset.is_mobile)
            .build()
            .map_err(super::error::BrowserError::Configuration)?;
        page.execute(params).await?;
        checks.push(inspect_viewport(page, preset).await?);
    }
    let aggregate_score = if checks.is_empty() {
        0.0
    } else {
        checks.iter().map(|c| c.score).sum::<f64>() / checks.len() as f64
    };
    Ok(ResponsiveReport {
        checks,
        aggregate_score,
    })
}

async fn inspect_viewport(page: &Page, preset: ViewportPreset) -> BrowserResult<ViewportCheck> {
    let script = format!(
        r#"(() => {{
    const hasHorizontalScroll = document.documentElement.scrollWidth > window.innerWidth;
    const hasViewportMeta = !!document.querySelector('meta[name="viewport"]');
    const images = Array.from(document.images);
    const responsiveImages = images.filter(img => {{
        const style = getComputedStyle(img);
        return style.maxWidth === '100%' || img.hasAttribute('srcset');
    }});
    const responsiveImageRatio = images.length ? responsiveImages.length / images.length : 1.0;
    const targets = Array.from(document.querySelectorAll('button, a, input, select, textarea'));
    const smallTargets = targets.filter(el => {{
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0 && (rect.width < {min_touch} || rect.height < {min_touch});
    }});
    const touchTargetsOk = !{is_mobile} || smallTargets.length === 0;
    const fixedWidthPenalty = Array.from(document.querySelectorAll('body *')).some(el => {{
        const style = getComputedStyle(el);
        return style.width.endsWith('px') && parseFloat(style.width) > window.innerWidth;
    }});
    const textNodes = Array.from(document.querySelectorAll('p, span, li, a, h1, h2, h3, h4, h5, h6'));
    const readable = textNodes.filter(el => parseFloat(getComputedStyle(el).fontSize) >= {min_text});
    const readableTextRatio = textNodes.length ? readable.length / textNodes.length : 1.0;
    return JSON.stringify({{
        hasHorizontalScroll, hasViewportMeta, responsiveImageRatio,
        touchTargetsOk, fixedWidthPenalty, readableTextRatio
    }});
}})()"#,
        min_touch = MIN_TOUCH_TARGET_PX,
        is_mobile = preset.is_mobile,
        min_text = MIN_READABLE_TEXT_PX,
    );

    let raw = page
        .evaluate(script.as_str())
        .await
        .ok()
        .and_then(|result| result.into_value::<String>().ok());

    let parsed: serde_json::Value = raw
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(serde_json::json!({}));

    let has_horizontal_scroll = parsed["hasHorizontalScroll"].as_bool().unwrap_or(false);
    let has_viewport_meta = parsed["hasViewportMeta"].as_bool().unwrap_or(false);
    let responsive_image_ratio = parsed["responsiveImageRatio"].as_f64().unwrap_or(1.0);
    let touch_targets_ok = parsed["touchTargetsOk"].as_bool().unwrap_or(true);
    let fixed_width_penalty = parsed["fixedWidthPenalty"].as_bool().unwrap_or(false);
    let readable_text_ratio = parsed["readableTextRatio"].as_f64().unwrap_or(1.0);

    let mut score = 1.0;
    if has_horizontal_scroll {
        score -= 0.25;
    }
    if !has_viewport_meta {
        score -= 0.15;
    }
    score -= (1.0 - responsive_image_ratio) * 0.2;
    if !touch_targets_ok {
        score -= 0.2;
    }
    if fixed_width_penalty {
        score -= 0.1;
    }
    score -= (1.0 - readable_text_ratio) * 0.1;

    Ok(ViewportCheck {
        preset: preset.name.to_string(),
        has_horizontal_scroll,
        has_viewport_meta,
        responsive_image_ratio,
        touch_targets_ok,
        fixed_width_penalty,
        readable_text_ratio,
        score: score.clamp(0.0, 1.0),
    })
}
