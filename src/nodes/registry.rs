//! Node registry - resolves node type strings to executors.
//!
//! Built-in executors are consulted first, then plugin-provided ones.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::NodeExecutor;
use super::{ActionNode, AgentNode, ConditionNode, DelayNode, TaskNode, TriggerNode, WebhookNode};
use crate::plugins::{Plugin, PluginRegistry, ToolRegistry};

/// Registry of available node types.
#[derive(Clone)]
pub struct NodeRegistry {
    builtins: HashMap<String, Arc<dyn NodeExecutor>>,
    plugins: PluginRegistry,
}

impl NodeRegistry {
    /// Create a new registry with the built-in node types.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(TriggerNode::new()));
        registry.register(Arc::new(ConditionNode::new()));
        registry.register(Arc::new(ActionNode::new()));
        registry.register(Arc::new(AgentNode::new()));
        registry.register(Arc::new(TaskNode::new()));
        registry.register(Arc::new(DelayNode::new()));
        registry.register(Arc::new(WebhookNode::new()));

        registry
    }

    /// Create an empty registry (for testing).
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
            plugins: PluginRegistry::new(),
        }
    }

    /// Register (or replace) a built-in executor.
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.builtins
            .insert(executor.node_type().to_string(), executor);
    }

    /// Register a plugin's executors and tools.
    pub fn register_plugin(&mut self, plugin: &dyn Plugin) {
        self.plugins.register(plugin);
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Resolve a node type: built-in first, then plugin.
    pub fn resolve(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.builtins
            .get(node_type)
            .cloned()
            .or_else(|| self.plugins.executor(node_type))
    }

    /// Check if a node type can be resolved.
    pub fn has(&self, node_type: &str) -> bool {
        self.resolve(node_type).is_some()
    }

    /// Tools contributed by plugins.
    pub fn tools(&self) -> &ToolRegistry {
        self.plugins.tools()
    }

    /// List all resolvable node types, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builtins.keys().map(|s| s.as_str()).collect();
        for plugin_type in self.plugins.node_types() {
            if !self.builtins.contains_key(plugin_type) {
                types.push(plugin_type);
            }
        }
        types.sort_unstable();
        types
    }

    /// Get descriptions of the built-in nodes.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut descriptions: Vec<(&str, &str)> = self
            .builtins
            .iter()
            .map(|(name, node)| (name.as_str(), node.description()))
            .collect();
        descriptions.sort_unstable();
        descriptions
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::nodes::{NodeContext, NodeOutput};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeCondition;

    #[async_trait]
    impl NodeExecutor for FakeCondition {
        fn node_type(&self) -> &str {
            "condition"
        }

        async fn execute(&self, _config: &Value, _ctx: &NodeContext) -> Result<NodeOutput> {
            Ok(NodeOutput::new(json!("plugin")))
        }
    }

    struct Sparkle;

    #[async_trait]
    impl NodeExecutor for Sparkle {
        fn node_type(&self) -> &str {
            "sparkle"
        }

        async fn execute(&self, _config: &Value, _ctx: &NodeContext) -> Result<NodeOutput> {
            Ok(NodeOutput::new(json!("sparkle")))
        }
    }

    struct Extras;

    impl Plugin for Extras {
        fn name(&self) -> &str {
            "extras"
        }

        fn node_executors(&self) -> Vec<Arc<dyn NodeExecutor>> {
            vec![Arc::new(FakeCondition), Arc::new(Sparkle)]
        }
    }

    #[test]
    fn test_registry_default_nodes() {
        let registry = NodeRegistry::new();
        assert_eq!(
            registry.list(),
            vec!["action", "ai-agent", "condition", "delay", "task", "trigger", "webhook"]
        );
        assert!(!registry.has("nonexistent"));
    }

    #[tokio::test]
    async fn test_builtin_wins_over_plugin() {
        let mut registry = NodeRegistry::new();
        registry.register_plugin(&Extras);

        let sparkle = registry.resolve("sparkle").unwrap();
        assert_eq!(sparkle.node_type(), "sparkle");

        let condition = registry.resolve("condition").unwrap();
        let ctx = NodeContext::new("exec-1", "wf");
        let output = condition
            .execute(&json!({"field": "x", "operator": "exists"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.port.as_deref(), Some("false"));
        assert!(registry.list().contains(&"sparkle"));
    }
}
