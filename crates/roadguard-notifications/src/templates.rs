use std::collections::HashMap;

use roadguard_core::AccidentEvent;
use serde::{Deserialize, Serialize};

use crate::types::AlertMessage;

pub const DEFAULT_SUBJECT: &str = "RoadGuard: accident reported ({{severity_percent}}% severity)";
pub const DEFAULT_BODY: &str = "RoadGuard detected a possible accident for {{user_id}}. \
Severity {{severity_percent}}% at {{lat}}, {{lng}}: {{map_link}} (event {{event_id}})";

/// Subject and body templates using `{{variable}}` syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTemplates {
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_body")]
    pub body: String,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

impl Default for AlertTemplates {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            body: default_body(),
        }
    }
}

/// Builds the alert sent to emergency contacts for an event.
#[derive(Debug, Clone, Default)]
pub struct AlertComposer {
    templates: AlertTemplates,
}

impl AlertComposer {
    pub fn new(templates: AlertTemplates) -> Self {
        Self { templates }
    }

    pub fn compose(&self, event: &AccidentEvent) -> AlertMessage {
        let data = Self::event_data(event);
        AlertMessage {
            subject: Some(render(&self.templates.subject, &data)),
            body: render(&self.templates.body, &data),
        }
    }

    /// Template variables for an event.
    pub fn event_data(event: &AccidentEvent) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("event_id".to_string(), event.id.clone().into()),
            ("user_id".to_string(), event.user_id.clone().into()),
            ("severity".to_string(), event.severity.into()),
            ("severity_percent".to_string(), event.severity_percent().into()),
            ("lat".to_string(), event.location.lat.into()),
            ("lng".to_string(), event.location.lng.into()),
            ("map_link".to_string(), event.location.map_link().into()),
            ("status".to_string(), event.status.as_str().into()),
        ])
    }
}

/// Replace every `{{key}}` in `template` with the matching value.
/// Unknown placeholders are left as is.
///
/// Substituted values are copied verbatim and never rescanned, so a value
/// that itself contains `{{...}}` comes out literally.
pub fn render(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            rest = &rest[open..];
            break;
        };

        let key = &after_open[..close];
        match data.get(key) {
            Some(value) => push_value(&mut result, value),
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}

fn push_value(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Null => {}
        _ => out.push_str(&value.to_string()),
    }
}
