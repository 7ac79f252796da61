//! Trigger node - entry point of a workflow.
//!
//! Does no work of its own; it surfaces what started the run so later
//! nodes can reference `${trigger_output.triggeredBy}` and friends.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::TRIGGER;
use crate::error::Result;

pub struct TriggerNode;

impl TriggerNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TriggerNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for TriggerNode {
    fn node_type(&self) -> &str {
        TRIGGER
    }

    fn description(&self) -> &str {
        "Workflow entry point (manual, event or schedule)"
    }

    async fn execute(&self, _config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        Ok(NodeOutput::new(json!({
            "triggeredBy": ctx.triggered_by,
            "event": ctx.variable("event").cloned().unwrap_or(Value::Null),
            "entity": ctx.variable("entity").cloned().unwrap_or(Value::Null),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_surfaces_context() {
        let ctx = NodeContext::new("exec-1", "wf")
            .with_triggered_by("persona-7")
            .with_variables(json!({"entity": {"id": "t1"}}).as_object().unwrap().clone());

        let output = TriggerNode::new().execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(output.data["triggeredBy"], "persona-7");
        assert_eq!(output.data["entity"]["id"], "t1");
        assert!(output.data["event"].is_null());
        assert!(output.port.is_none());
    }
}
