//! `${name}` interpolation over execution variables.
//!
//! Node executors apply this to their own configuration; the engine never
//! rewrites node config. Dotted paths (`${task.title}`) and numeric array
//! segments (`${items.0}`) are supported. Unknown names render as empty
//! strings.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{\s*([A-Za-z0-9_.\-]+)\s*\}").expect("valid regex"))
}

/// Look up a dotted path in the variables.
pub fn lookup<'a>(variables: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Convert a JSON value to text for substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Render every `${...}` placeholder in a string.
pub fn render_string(template: &str, variables: &Map<String, Value>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex_lite::Captures| {
            lookup(variables, &caps[1])
                .map(value_to_string)
                .unwrap_or_default()
        })
        .to_string()
}

/// Render placeholders inside any JSON value.
///
/// A string consisting of exactly one placeholder is replaced by the
/// referenced value itself, keeping its JSON type.
pub fn render_value(value: &Value, variables: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(path) = sole_placeholder(s) {
                return lookup(variables, path).cloned().unwrap_or(Value::Null);
            }
            Value::String(render_string(s, variables))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, variables)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let caps = placeholder_regex().captures(s.trim())?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == s.trim().len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Map<String, Value> {
        json!({
            "name": "Ada",
            "count": 3,
            "task": {"title": "Ship it", "tags": ["a", "b"]},
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_render_simple_and_dotted() {
        let out = render_string("Hi ${name}, ${task.title} (${count})", &vars());
        assert_eq!(out, "Hi Ada, Ship it (3)");
    }

    #[test]
    fn test_render_array_index_and_missing() {
        assert_eq!(render_string("${task.tags.1}", &vars()), "b");
        assert_eq!(render_string("[${nope}]", &vars()), "[]");
    }

    #[test]
    fn test_render_value_keeps_type_for_sole_placeholder() {
        let rendered = render_value(&json!({"n": "${count}", "s": "n=${count}"}), &vars());
        assert_eq!(rendered["n"], json!(3));
        assert_eq!(rendered["s"], json!("n=3"));
    }

    #[test]
    fn test_lookup_nested() {
        assert_eq!(lookup(&vars(), "task.title"), Some(&json!("Ship it")));
        assert!(lookup(&vars(), "task.title.deeper").is_none());
    }
}
