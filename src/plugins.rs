//! Plugins contribute extra node executors and agent tools.
//!
//! Built-in node types always win over a plugin executor with the same
//! type string.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::nodes::NodeExecutor;

/// A callable tool an agent may request.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn call(&self, arguments: &Value) -> Result<Value>;
}

/// A bundle of node executors and tools.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn node_executors(&self) -> Vec<Arc<dyn NodeExecutor>> {
        Vec::new()
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
}

/// Tools by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if self.tools.insert(tool.name().to_string(), tool.clone()).is_some() {
            warn!(tool = tool.name(), "Tool registered twice; keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Executors and tools collected from registered plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
    tools: ToolRegistry,
    plugins: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register everything a plugin contributes.
    pub fn register(&mut self, plugin: &dyn Plugin) {
        for executor in plugin.node_executors() {
            let node_type = executor.node_type().to_string();
            if self.executors.insert(node_type.clone(), executor).is_some() {
                warn!(
                    plugin = plugin.name(),
                    node_type = %node_type,
                    "Node type already provided by another plugin; replacing it"
                );
            }
        }
        for tool in plugin.tools() {
            self.tools.register(tool);
        }
        debug!(plugin = plugin.name(), "Plugin registered");
        self.plugins.push(plugin.name().to_string());
    }

    pub fn executor(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }

    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn plugin_names(&self) -> &[String] {
        &self.plugins
    }
}

/// The only reply shapes accepted from a tool-enabled agent.
///
/// ```json
/// {"type": "final", "output": ...}
/// {"type": "tool_call", "tool": "lookup", "arguments": {...}}
/// ```
///
/// Anything else, including extra fields or prose around the JSON, is
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AgentReply {
    Final {
        #[serde(default)]
        output: Value,
    },
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
}

impl AgentReply {
    /// Parse an agent's output. A string must be exactly one JSON document.
    pub fn parse(output: &Value) -> Result<Self> {
        let parsed = match output {
            Value::String(text) => serde_json::from_str(text.trim()),
            other => serde_json::from_value(other.clone()),
        };
        parsed.map_err(|e| Error::Node(format!("Malformed agent reply: {}", e)))
    }
}
