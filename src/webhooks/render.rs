//! Turns a webhook's payload template into a JSON object.
//!
//! Both engines see the same scope, `{ "event": <serialised DomainEvent> }`, and
//! address it with `{{ dotted.path }}` placeholders. Numeric segments index
//! arrays; a path that resolves to nothing renders as `null`.

use crate::domain::events::DomainEvent;
use crate::domain::webhook::{RenderEngine, Webhook};
use crate::error::Result;
use regex::{Captures, Regex};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

static WHOLE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}\s*$")
        .expect("placeholder pattern is valid")
});

/// Why a webhook was not delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    BlankTemplate,
    InvalidJson(String),
    NotAnObject,
    EmptyPayload,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BlankTemplate => f.write_str("template is blank"),
            SkipReason::InvalidJson(e) => write!(f, "rendered payload is not valid JSON: {e}"),
            SkipReason::NotAnObject => f.write_str("rendered payload is not an object"),
            SkipReason::EmptyPayload => f.write_str("rendered payload is empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Payload(Map<String, Value>),
    Skipped(SkipReason),
}

pub fn scope(event: &DomainEvent) -> Result<Value> {
    Ok(json!({ "event": serde_json::to_value(event)? }))
}

fn lookup<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(scope, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn resolve(scope: &Value, path: &str) -> Value {
    lookup(scope, path).cloned().unwrap_or(Value::Null)
}

/// Text form of a value inside a larger string: strings bare, the rest as JSON.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text form of a value spliced into JSON source: strings escaped without quotes.
fn as_json_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let quoted = Value::String(s.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        other => other.to_string(),
    }
}

fn evaluate(template: &Value, scope: &Value) -> Value {
    match template {
        Value::String(s) => {
            if let Some(caps) = WHOLE_PLACEHOLDER.captures(s) {
                resolve(scope, &caps[1])
            } else {
                let replaced = PLACEHOLDER.replace_all(s, |caps: &Captures| {
                    as_text(&resolve(scope, &caps[1]))
                });
                Value::String(replaced.into_owned())
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| evaluate(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), evaluate(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn into_payload(value: Value) -> Rendered {
    match value {
        Value::Object(map) if map.is_empty() => Rendered::Skipped(SkipReason::EmptyPayload),
        Value::Object(map) => Rendered::Payload(map),
        Value::Null => Rendered::Skipped(SkipReason::EmptyPayload),
        _ => Rendered::Skipped(SkipReason::NotAnObject),
    }
}

pub fn render(webhook: &Webhook, scope: &Value) -> Rendered {
    match webhook.render {
        RenderEngine::Expression => match &webhook.payload_json {
            None | Some(Value::Null) => Rendered::Skipped(SkipReason::BlankTemplate),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Rendered::Skipped(SkipReason::BlankTemplate)
            }
            Some(template) => into_payload(evaluate(template, scope)),
        },
        RenderEngine::TemplateString => {
            let Some(text) = webhook.payload_text.as_deref().filter(|t| !t.trim().is_empty())
            else {
                return Rendered::Skipped(SkipReason::BlankTemplate);
            };
            let source = PLACEHOLDER.replace_all(text, |caps: &Captures| {
                as_json_fragment(&resolve(scope, &caps[1]))
            });
            match serde_json::from_str::<Value>(&source) {
                Ok(value) => into_payload(value),
                Err(e) => Rendered::Skipped(SkipReason::InvalidJson(e.to_string())),
            }
        }
    }
}
