use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

const ENV_PREFIX: &str = "TESTCTL_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TestctlConfig {
    pub browser_automation: BrowserAutomationSection,
    pub api_testing: ApiTestingSection,
    pub ai_quality: AiQualitySection,
    pub results_aggregation: ResultsAggregationSection,
    pub notification: NotificationSection,
    pub orchestration: OrchestrationSection,
}

impl Default for TestctlConfig {
    fn default() -> Self {
        Self {
            browser_automation: BrowserAutomationSection::default(),
            api_testing: ApiTestingSection::default(),
            ai_quality: AiQualitySection::default(),
            results_aggregation: ResultsAggregationSection::default(),
            notification: NotificationSection::default(),
            orchestration: OrchestrationSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BrowserAutomationSection {
    pub max_concurrent_contexts: u32,
    pub default_timeout_ms: u64,
    pub screenshots_dir: String,
    pub videos_dir: String,
    pub browser_types: Vec<String>,
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub visual_threshold: f64,
    pub accessibility_standards: Vec<String>,
}

impl Default for BrowserAutomationSection {
    fn default() -> Self {
        Self {
            max_concurrent_contexts: 10,
            default_timeout_ms: 30_000,
            screenshots_dir: "evidence/screenshots".into(),
            videos_dir: "evidence/videos".into(),
            browser_types: vec!["chromium".into()],
            headless: true,
            slow_mo_ms: 0,
            visual_threshold: 0.1,
            accessibility_standards: vec!["WCAG2A".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ApiTestingSection {
    pub default_timeout_seconds: u64,
    pub max_retries: u8,
    pub retry_delay_seconds: u64,
    pub default_max_response_time_ms: u64,
    pub enable_load_testing: bool,
    pub max_concurrent_requests: u32,
    /// Header name the auth token below is injected under (§4.1:
    /// "Headers are merged as {auth-injected} ⊕ {spec headers}").
    pub auth_header_name: String,
    /// Name of the environment variable holding the bearer token to
    /// inject; empty or unset means no auth header is injected.
    pub auth_token_env_var: String,
}

impl Default for ApiTestingSection {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1,
            default_max_response_time_ms: 2000,
            enable_load_testing: true,
            max_concurrent_requests: 100,
            auth_header_name: "Authorization".into(),
            auth_token_env_var: "TESTCTL_API_AUTH_TOKEN".into(),
        }
    }
}

impl ApiTestingSection {
    /// Reads `auth_token_env_var` from the process environment and, if
    /// set, returns the single `{auth_header_name: "Bearer <token>"}`
    /// pair to inject ahead of every scenario's own `spec.headers`.
    pub fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if self.auth_token_env_var.is_empty() {
            return headers;
        }
        if let Ok(token) = std::env::var(&self.auth_token_env_var) {
            if !token.is_empty() {
                headers.insert(self.auth_header_name.clone(), format!("Bearer {token}"));
            }
        }
        headers
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AiQualitySection {
    pub default_models: Vec<String>,
    /// One HTTP endpoint per entry in `default_models`, same order.
    pub judge_endpoints: Vec<String>,
    pub timeout_seconds: u64,
    pub max_retries: u8,
    pub enable_ensemble: bool,
    pub quality_threshold: f64,
    pub cache_ttl_seconds: u64,
}

impl Default for AiQualitySection {
    fn default() -> Self {
        Self {
            default_models: vec!["primary-judge".into(), "secondary-judge".into()],
            judge_endpoints: vec![
                "http://localhost:9101/assess".into(),
                "http://localhost:9102/assess".into(),
            ],
            timeout_seconds: 60,
            max_retries: 2,
            enable_ensemble: true,
            quality_threshold: 0.7,
            cache_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ResultsAggregationSection {
    pub enable_real_time_aggregation: bool,
    pub auto_generate_reports: bool,
    pub report_formats: Vec<String>,
    pub cleanup_interval_hours: u32,
    pub max_stored_results: usize,
    pub max_window_days: i64,
    pub min_data_points_for_trend: usize,
}

impl Default for ResultsAggregationSection {
    fn default() -> Self {
        Self {
            enable_real_time_aggregation: true,
            auto_generate_reports: true,
            report_formats: vec!["json".into(), "markdown".into(), "csv".into()],
            cleanup_interval_hours: 24,
            max_stored_results: 10_000,
            max_window_days: 7,
            min_data_points_for_trend: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EmailChannelSection {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub use_tls: bool,
    pub from_address: String,
}

impl Default for EmailChannelSection {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "localhost".into(),
            smtp_port: 587,
            use_tls: true,
            from_address: "alerts@testctl.local".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SlackChannelSection {
    pub enabled: bool,
    pub webhook_url: String,
    pub default_channel: String,
}

impl Default for SlackChannelSection {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            default_channel: "#alerts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct WebhookChannelSection {
    pub enabled: bool,
    pub webhook_url: String,
    pub method: String,
}

impl Default for WebhookChannelSection {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: "http://localhost:9999/webhook".into(),
            method: "POST".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AlertDetectionSection {
    pub enabled: bool,
    pub min_quality_score: f64,
    pub max_failure_rate: f64,
}

impl Default for AlertDetectionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            min_quality_score: 0.7,
            max_failure_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct NotificationSection {
    pub enable_notifications: bool,
    pub notification_channels: Vec<String>,
    pub cooldown_minutes: u32,
    pub max_notifications_per_hour: u32,
    pub max_retries: u32,
    pub email: EmailChannelSection,
    pub slack: SlackChannelSection,
    pub webhook: WebhookChannelSection,
    pub alert_detection: AlertDetectionSection,
    pub log_directory: String,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            enable_notifications: true,
            notification_channels: vec!["console".into(), "file".into()],
            cooldown_minutes: 15,
            max_notifications_per_hour: 10,
            max_retries: 3,
            email: EmailChannelSection::default(),
            slack: SlackChannelSection::default(),
            webhook: WebhookChannelSection::default(),
            alert_detection: AlertDetectionSection::default(),
            log_directory: "evidence/notifications".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct OrchestrationSection {
    pub services_base_port: u16,
    pub health_check_interval_seconds: u64,
    pub health_cache_ttl_seconds: u64,
    pub max_concurrent_sessions: u32,
    pub default_timeout_minutes: u64,
    pub quality_threshold: f64,
}

impl Default for OrchestrationSection {
    fn default() -> Self {
        Self {
            services_base_port: 8000,
            health_check_interval_seconds: 30,
            health_cache_ttl_seconds: 60,
            max_concurrent_sessions: 10,
            default_timeout_minutes: 60,
            quality_threshold: 0.8,
        }
    }
}

impl TestctlConfig {
    /// Loads config from a TOML file at `path`, then applies any
    /// `TESTCTL_`-prefixed environment variable overrides. A variable name
    /// maps to a dotted config path by splitting on `__` and lower-casing,
    /// e.g. `TESTCTL_BROWSER_AUTOMATION__MAX_CONCURRENT_CONTEXTS=20`
    /// overrides `browser_automation.max_concurrent_contexts`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        Self::parse(&raw, path.to_path_buf())
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(_) => {
                let mut config = TestctlConfig::default();
                if let Err(error) = config.apply_env_overrides(std::env::vars()) {
                    tracing::warn!(%error, "ignoring invalid environment override");
                }
                config
            }
        }
    }

    fn parse(raw: &str, path: PathBuf) -> Result<Self> {
        let mut value: toml::Value =
            toml::from_str(raw).map_err(|source| ConfigError::Parse { source, path: path.clone() })?;
        apply_overrides_to_toml(&mut value, std::env::vars())?;
        value.try_into().map_err(|source| ConfigError::Parse { source, path })
    }

    fn apply_env_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) -> Result<()> {
        let mut value = toml::Value::try_from(&*self).unwrap_or(toml::Value::Table(Default::default()));
        apply_overrides_to_toml(&mut value, vars)?;
        if let Ok(config) = value.try_into() {
            *self = config;
        }
        Ok(())
    }
}

fn apply_overrides_to_toml(root: &mut toml::Value, vars: impl Iterator<Item = (String, String)>) -> Result<()> {
    let overrides: HashMap<String, String> = vars
        .filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .map(|rest| (rest.to_ascii_lowercase(), value))
        })
        .collect();

    for (key, raw_value) in overrides {
        let path: Vec<&str> = key.split("__").collect();
        let leaf = parse_scalar(&raw_value);
        set_nested(root, &path, leaf, &key, &raw_value)?;
    }
    Ok(())
}

fn set_nested(root: &mut toml::Value, path: &[&str], leaf: toml::Value, key: &str, raw_value: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    if !root.is_table() {
        *root = toml::Value::Table(Default::default());
    }
    let table = root.as_table_mut().expect("checked above");
    if path.len() == 1 {
        if let Some(existing) = table.get(path[0]) {
            if !scalar_types_compatible(existing, &leaf) {
                return Err(ConfigError::InvalidOverride {
                    key: key.to_string(),
                    value: raw_value.to_string(),
                });
            }
        }
        table.insert(path[0].to_string(), leaf);
        return Ok(());
    }
    let entry = table
        .entry(path[0].to_string())
        .or_insert_with(|| toml::Value::Table(Default::default()));
    set_nested(entry, &path[1..], leaf, key, raw_value)
}

/// An override is rejected when it would change the scalar kind of an
/// existing value (e.g. overriding a boolean flag with a non-boolean
/// string). Integers and floats are treated as interchangeable since
/// both deserialize into either Rust numeric type.
fn scalar_types_compatible(existing: &toml::Value, leaf: &toml::Value) -> bool {
    use toml::Value::*;
    matches!(
        (existing, leaf),
        (Boolean(_), Boolean(_))
            | (String(_), String(_))
            | (Integer(_), Integer(_))
            | (Float(_), Float(_))
            | (Integer(_), Float(_))
            | (Float(_), Integer(_))
    )
}

fn parse_scalar(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return toml::Value::Float(f);
    }
    toml::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TestctlConfig::default();
        assert_eq!(config.browser_automation.max_concurrent_contexts, 10);
        assert_eq!(config.ai_quality.cache_ttl_seconds, 3600);
        assert_eq!(config.results_aggregation.max_stored_results, 10_000);
        assert_eq!(config.notification.cooldown_minutes, 15);
    }

    #[test]
    fn auth_headers_are_empty_when_the_env_var_is_unset() {
        let section = ApiTestingSection::default();
        std::env::remove_var(&section.auth_token_env_var);
        assert!(section.auth_headers().is_empty());
    }

    #[test]
    fn auth_headers_inject_a_bearer_token_from_the_configured_env_var() {
        let section = ApiTestingSection::default();
        std::env::set_var(&section.auth_token_env_var, "secret-token");
        let headers = section.auth_headers();
        std::env::remove_var(&section.auth_token_env_var);
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer secret-token"));
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let toml_src = "[browser_automation]\nmax_concurrent_contexts = 5\n";
        std::env::set_var(
            "TESTCTL_BROWSER_AUTOMATION__MAX_CONCURRENT_CONTEXTS",
            "42",
        );
        let config = TestctlConfig::parse(toml_src, PathBuf::from("test.toml")).unwrap();
        std::env::remove_var("TESTCTL_BROWSER_AUTOMATION__MAX_CONCURRENT_CONTEXTS");
        assert_eq!(config.browser_automation.max_concurrent_contexts, 42);
    }

    #[test]
    fn override_with_incompatible_type_is_rejected() {
        let toml_src = "[browser_automation]\nmax_concurrent_contexts = 5\n";
        std::env::set_var(
            "TESTCTL_BROWSER_AUTOMATION__MAX_CONCURRENT_CONTEXTS",
            "not-a-number",
        );
        let result = TestctlConfig::parse(toml_src, PathBuf::from("test.toml"));
        std::env::remove_var("TESTCTL_BROWSER_AUTOMATION__MAX_CONCURRENT_CONTEXTS");
        assert!(matches!(result, Err(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = TestctlConfig::load_or_default("/nonexistent/path/testctl.toml");
        assert_eq!(config.orchestration.quality_threshold, 0.8);
    }
}
