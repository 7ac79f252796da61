//! Node executor trait and context types.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::engine::EngineServices;
use crate::error::Result;

/// Result of node execution.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    /// Output data, stored under the node's output variable
    pub data: Value,
    /// Exit port to follow; `None` means the node's first declared output
    pub port: Option<String>,
    /// Top-level variable assignments merged into the execution context
    pub variables: Map<String, Value>,
}

impl NodeOutput {
    /// Create an output leaving through the default port.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            port: None,
            variables: Map::new(),
        }
    }

    /// Create an output leaving through a named port.
    pub fn on_port(data: Value, port: impl Into<String>) -> Self {
        Self {
            data,
            port: Some(port.into()),
            variables: Map::new(),
        }
    }

    /// Assign top-level variables in addition to the node output.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }
}

/// Context passed to a node executor.
///
/// A snapshot: executors read it, they never write it back. The engine
/// merges the returned [`NodeOutput`] itself.
#[derive(Clone)]
pub struct NodeContext {
    pub execution_id: String,

    pub workflow_id: String,

    /// ID of the node being executed
    pub node_id: String,

    /// Persona ID or `"system"`
    pub triggered_by: String,

    /// Execution variables at the time the node started
    pub variables: Map<String, Value>,

    /// Outputs of the nodes that already ran, keyed by node ID
    pub node_results: Map<String, Value>,

    /// Injected collaborators (agent, task creation, tools)
    pub services: EngineServices,
}

impl NodeContext {
    /// Create a new context.
    pub fn new(execution_id: &str, workflow_id: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: String::new(),
            triggered_by: "system".to_string(),
            variables: Map::new(),
            node_results: Map::new(),
            services: EngineServices::default(),
        }
    }

    pub fn with_node(mut self, node_id: &str) -> Self {
        self.node_id = node_id.to_string();
        self
    }

    pub fn with_triggered_by(mut self, triggered_by: &str) -> Self {
        self.triggered_by = triggered_by.to_string();
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_services(mut self, services: EngineServices) -> Self {
        self.services = services;
        self
    }

    /// Get a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Get a previous node's output.
    pub fn get_result(&self, node_id: &str) -> Option<&Value> {
        self.node_results.get(node_id)
    }
}

/// Trait that all node executors implement.
///
/// Built-in executors ship with the crate; plugins contribute more keyed by
/// custom type strings.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Get the node type name (e.g., "condition", "ai-agent").
    fn node_type(&self) -> &str;

    /// Execute the node with its configuration (`node.data`) and context.
    ///
    /// Returning `Err` counts as a node failure and is subject to the
    /// workflow's retry settings.
    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput>;

    /// Get a description of this node type.
    fn description(&self) -> &str {
        "A workflow node"
    }
}
