//! Task node - create a task through the task service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::template::render_string;
use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::TASK;
use crate::engine::TaskDraft;
use crate::error::{Error, Result};

pub struct TaskNode;

impl TaskNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TaskNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskNodeConfig {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[async_trait]
impl NodeExecutor for TaskNode {
    fn node_type(&self) -> &str {
        TASK
    }

    fn description(&self) -> &str {
        "Create a task"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: TaskNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid task config: {}", e)))?;
        let tasks = ctx.services.tasks()?;

        let render = |s: &Option<String>| {
            s.as_deref()
                .map(|s| render_string(s, &ctx.variables))
                .filter(|s| !s.is_empty())
        };

        let title = render_string(&config.title, &ctx.variables);
        if title.trim().is_empty() {
            return Err(Error::Node("Task title rendered empty".to_string()));
        }

        let draft = TaskDraft {
            title,
            description: render(&config.description),
            priority: render(&config.priority),
            status: render(&config.status),
            assignee: render(&config.assignee),
            project_id: render(&config.project_id),
            tags: config
                .tags
                .iter()
                .map(|t| render_string(t, &ctx.variables))
                .filter(|t| !t.is_empty())
                .collect(),
            created_by: ctx.triggered_by.clone(),
            workflow_execution_id: Some(ctx.execution_id.clone()),
        };

        let created = tasks.create_task(draft).await?;
        let task_id = created.get("id").and_then(Value::as_str).unwrap_or("");
        info!(execution_id = %ctx.execution_id, task_id, "Task created");
        Ok(NodeOutput::new(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineServices;
    use crate::storage::MemoryTaskService;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_creates_rendered_task() {
        let tasks = Arc::new(MemoryTaskService::new());
        let ctx = NodeContext::new("exec-1", "wf")
            .with_triggered_by("persona-1")
            .with_variables(json!({"entity": {"title": "Login bug"}}).as_object().unwrap().clone())
            .with_services(EngineServices::new().with_tasks(tasks.clone()));
        let config = json!({
            "title": "Follow up: ${entity.title}",
            "priority": "high",
            "assignee": "${missing}",
            "tags": ["auto", "${nothing}"]
        });

        let output = TaskNode::new().execute(&config, &ctx).await.unwrap();
        assert_eq!(output.data["title"], "Follow up: Login bug");

        let created = tasks.created().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["createdBy"], "persona-1");
        assert_eq!(created[0]["workflowExecutionId"], "exec-1");
        assert_eq!(created[0]["tags"], json!(["auto"]));
        assert!(created[0].get("assignee").is_none());
    }

    #[tokio::test]
    async fn test_requires_task_service() {
        let ctx = NodeContext::new("exec-1", "wf");
        let err = TaskNode::new()
            .execute(&json!({"title": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task service"));
    }
}
