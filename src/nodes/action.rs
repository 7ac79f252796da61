//! Action node - small in-engine side effects.
//!
//! `actionType`:
//! - `setVariables`: render `variables` and assign them at the top level
//! - `log`: render `message` and write it to the log at `level`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::template::{render_string, render_value};
use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::ACTION;
use crate::error::{Error, Result};

pub struct ActionNode;

impl ActionNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ActionNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
enum ActionConfig {
    SetVariables {
        #[serde(default)]
        variables: Map<String, Value>,
    },
    Log {
        message: String,
        #[serde(default = "default_level")]
        level: String,
    },
}

fn default_level() -> String {
    "info".to_string()
}

#[async_trait]
impl NodeExecutor for ActionNode {
    fn node_type(&self) -> &str {
        ACTION
    }

    fn description(&self) -> &str {
        "Set variables or write a log line"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: ActionConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid action config: {}", e)))?;

        match config {
            ActionConfig::SetVariables { variables } => {
                let rendered: Map<String, Value> = variables
                    .iter()
                    .map(|(k, v)| (k.clone(), render_value(v, &ctx.variables)))
                    .collect();
                Ok(NodeOutput::new(Value::Object(rendered.clone())).with_variables(rendered))
            }
            ActionConfig::Log { message, level } => {
                let message = render_string(&message, &ctx.variables);
                let execution_id = ctx.execution_id.as_str();
                match level.to_lowercase().as_str() {
                    "debug" => debug!(execution_id, "{}", message),
                    "warn" => warn!(execution_id, "{}", message),
                    "error" => error!(execution_id, "{}", message),
                    _ => info!(execution_id, "{}", message),
                }
                Ok(NodeOutput::new(json!({ "logged": message, "level": level })))
            }
        }
    }
}
