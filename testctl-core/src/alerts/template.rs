use std::collections::HashMap;

use regex::Regex;

use crate::contracts::{Alert, AlertType, Channel};

#[derive(Clone)]
struct Template {
    subject: String,
    body: String,
}

/// Resolves a notification's subject/body from the most specific
/// registered template, falling back `(alert_type, channel)` ->
/// `alert_type` -> a generic default (§4.5).
pub struct TemplateSet {
    by_type_and_channel: HashMap<(AlertType, Channel), Template>,
    by_type: HashMap<AlertType, Template>,
    default_template: Template,
}

impl TemplateSet {
    pub fn default_set() -> Self {
        Self {
            by_type_and_channel: HashMap::new(),
            by_type: HashMap::new(),
            default_template: Template {
                subject: "[{priority}] {title}".to_string(),
                body: "{message}\n\nsource: {source_service}\ncreated at: {created_at}".to_string(),
            },
        }
    }

    pub fn register(&mut self, alert_type: AlertType, channel: Option<Channel>, subject: impl Into<String>, body: impl Into<String>) {
        let template = Template { subject: subject.into(), body: body.into() };
        match channel {
            Some(channel) => {
                self.by_type_and_channel.insert((alert_type, channel), template);
            }
            None => {
                self.by_type.insert(alert_type, template);
            }
        }
    }

    fn resolve(&self, alert_type: AlertType, channel: Channel) -> &Template {
        self.by_type_and_channel
            .get(&(alert_type, channel))
            .or_else(|| self.by_type.get(&alert_type))
            .unwrap_or(&self.default_template)
    }

    pub fn render(&self, alert: &Alert, source_service: &str, channel: Channel) -> (String, String) {
        let template = self.resolve(alert.alert_type, channel);
        let vars = variables(alert, source_service);
        (substitute(&template.subject, &vars), substitute(&template.body, &vars))
    }
}

fn variables(alert: &Alert, source_service: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("alert_id".into(), alert.id.to_string());
    vars.insert("alert_type".into(), format!("{:?}", alert.alert_type));
    vars.insert("title".into(), alert.title.clone());
    vars.insert("message".into(), alert.message.clone());
    vars.insert("priority".into(), format!("{:?}", alert.priority));
    vars.insert("source_service".into(), source_service.to_string());
    vars.insert("created_at".into(), alert.created_at.to_rfc3339());
    for (key, value) in &alert.details {
        vars.insert(format!("details.{key}"), value_to_plain_string(value));
    }
    for (key, value) in &alert.current_values {
        vars.insert(format!("current_values.{key}"), value.to_string());
    }
    vars
}

fn value_to_plain_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces every `{name}` token with its variable's value. An
/// unrecognised name renders as the empty string rather than failing —
/// a typo'd template must not block delivery.
fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let pattern = Regex::new(r"\{([a-zA-Z0-9_.]+)\}").expect("static pattern");
    pattern
        .replace_all(template, |caps: &regex::Captures| vars.get(&caps[1]).cloned().unwrap_or_default())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::AlertPriority;

    #[test]
    fn falls_back_from_channel_specific_to_type_to_default() {
        let mut templates = TemplateSet::default_set();
        templates.register(AlertType::TestFailure, None, "[{alert_type}] {title}", "generic body");
        templates.register(AlertType::TestFailure, Some(Channel::Slack), "slack: {title}", "slack body");
        let alert = Alert::new(AlertType::TestFailure, AlertPriority::High, "scenario broke", "boom");

        let (slack_subject, _) = templates.render(&alert, "alerts", Channel::Slack);
        assert_eq!(slack_subject, "slack: scenario broke");

        let (email_subject, _) = templates.render(&alert, "alerts", Channel::Email);
        assert_eq!(email_subject, "[TestFailure] scenario broke");

        let (console_subject, _) = templates.render(&Alert::new(AlertType::Custom, AlertPriority::Low, "t", "m"), "alerts", Channel::Console);
        assert_eq!(console_subject, "[Low] t");
    }

    #[test]
    fn unknown_variables_render_as_empty_string() {
        let rendered = substitute("value: {nope}", &HashMap::new());
        assert_eq!(rendered, "value: ");
    }
}
