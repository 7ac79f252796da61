//! Condition node - two-way branching on execution variables.
//!
//! Leaves through port `"true"` or `"false"`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::template::{lookup, render_value, value_to_string};
use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::CONDITION;
use crate::error::{Error, Result};

pub const TRUE_PORT: &str = "true";
pub const FALSE_PORT: &str = "false";

/// Condition node implementation.
pub struct ConditionNode;

impl ConditionNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConditionNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionConfig {
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default = "default_match_mode")]
    match_mode: String, // "all" | "any"

    // Single-condition shorthand
    #[serde(flatten)]
    single: Option<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    field: String,
    operator: String,
    #[serde(default)]
    value: Value,
}

fn default_match_mode() -> String {
    "all".to_string()
}

#[async_trait]
impl NodeExecutor for ConditionNode {
    fn node_type(&self) -> &str {
        CONDITION
    }

    fn description(&self) -> &str {
        "Evaluate conditions against variables and branch to the true or false port"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: ConditionConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid condition config: {}", e)))?;

        let conditions: Vec<&Condition> = if config.conditions.is_empty() {
            config.single.iter().collect()
        } else {
            config.conditions.iter().collect()
        };
        if conditions.is_empty() {
            return Err(Error::Node(
                "Condition node requires at least one condition".to_string(),
            ));
        }

        let match_mode = config.match_mode.to_lowercase();
        if match_mode != "all" && match_mode != "any" {
            return Err(Error::Node(format!(
                "Invalid matchMode '{}', expected 'all' or 'any'",
                config.match_mode
            )));
        }

        let mut results = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let left = resolve_field(&condition.field, &ctx.variables);
            let right = render_value(&condition.value, &ctx.variables);
            results.push(evaluate_condition(&left, &condition.operator, &right)?);
        }

        let passed = if match_mode == "any" {
            results.iter().any(|r| *r)
        } else {
            results.iter().all(|r| *r)
        };

        let port = if passed { TRUE_PORT } else { FALSE_PORT };
        Ok(NodeOutput::on_port(
            json!({
                "result": passed,
                "conditionsEvaluated": results.len(),
                "matchMode": match_mode,
            }),
            port,
        ))
    }
}

/// Resolve the left operand: a `${...}` template or a bare variable path.
fn resolve_field(field: &str, variables: &Map<String, Value>) -> Value {
    let field = field.trim();
    if field.contains("${") {
        return render_value(&Value::String(field.to_string()), variables);
    }
    lookup(variables, field).cloned().unwrap_or(Value::Null)
}

fn evaluate_condition(left: &Value, operator: &str, right: &Value) -> Result<bool> {
    match operator {
        "equals" => Ok(loosely_equal(left, right)),
        "notEquals" | "not_equals" => Ok(!loosely_equal(left, right)),
        "contains" => match left {
            Value::String(s) => Ok(right
                .as_str()
                .map(|needle| s.contains(needle))
                .unwrap_or(false)),
            Value::Array(items) => Ok(items.contains(right)),
            Value::Object(map) => Ok(right.as_str().map(|k| map.contains_key(k)).unwrap_or(false)),
            _ => Ok(false),
        },
        "exists" => Ok(!left.is_null()),
        "gt" | "lt" | "gte" | "lte" => {
            let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) else {
                return Ok(false);
            };
            Ok(match operator {
                "gt" => l > r,
                "lt" => l < r,
                "gte" => l >= r,
                "lte" => l <= r,
                _ => false,
            })
        }
        "regex" => {
            let pattern = right
                .as_str()
                .ok_or_else(|| Error::Node("regex operator requires string pattern".to_string()))?;
            let regex = regex_lite::Regex::new(pattern)
                .map_err(|e| Error::Node(format!("Invalid regex '{}': {}", pattern, e)))?;
            Ok(regex.is_match(&value_to_string(left)))
        }
        _ => Err(Error::Node(format!("Unsupported operator '{}'", operator))),
    }
}

/// Equality that treats `"5"` and `5` alike, since rendered templates are text.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::String(_), Value::Number(_)) | (Value::Number(_), Value::String(_)) => {
            matches!((as_f64(left), as_f64(right)), (Some(l), Some(r)) if l == r)
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
