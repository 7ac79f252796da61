//! Collaborators the engine calls out to.
//!
//! Agents, task creation and notifications live outside this crate; the
//! engine only sees these traits. [`HttpAgentClient`] is the bundled agent
//! transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::execution::WorkflowExecution;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::plugins::ToolRegistry;
use crate::workflow::Workflow;

/// Reply from an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
}

/// Runs an agent with an instruction.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn execute_agent(&self, agent_id: &str, instruction: &str) -> Result<AgentResponse>;
}

/// A task to create on behalf of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_execution_id: Option<String>,
}

/// Creates tasks. Returns the created task as JSON.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, task: TaskDraft) -> Result<Value>;
}

/// Told about finished executions when the workflow asks for it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, workflow: &Workflow, execution: &WorkflowExecution) -> Result<()>;
}

/// Services made available to node executors.
#[derive(Clone, Default)]
pub struct EngineServices {
    pub agent: Option<Arc<dyn AgentService>>,
    pub tasks: Option<Arc<dyn TaskService>>,
    pub tools: ToolRegistry,
}

impl EngineServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentService>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_tasks(mut self, tasks: Arc<dyn TaskService>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// The agent service, or an error naming the missing collaborator.
    pub fn agent(&self) -> Result<&Arc<dyn AgentService>> {
        self.agent
            .as_ref()
            .ok_or_else(|| Error::Node("No agent service configured".to_string()))
    }

    /// The task service, or an error naming the missing collaborator.
    pub fn tasks(&self) -> Result<&Arc<dyn TaskService>> {
        self.tasks
            .as_ref()
            .ok_or_else(|| Error::Node("No task service configured".to_string()))
    }
}

/// Agent service that POSTs `{agentId, instruction}` to an HTTP endpoint
/// and expects `{success, output}` back.
pub struct HttpAgentClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.endpoint.clone()).with_timeout(Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AgentService for HttpAgentClient {
    async fn execute_agent(&self, agent_id: &str, instruction: &str) -> Result<AgentResponse> {
        debug!(agent_id, endpoint = %self.endpoint, "Calling agent");
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&json!({ "agentId": agent_id, "instruction": instruction }))
            .send()
            .await
            .map_err(|e| Error::Node(format!("Agent request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Node(format!(
                "Agent API error ({}): {}",
                status, error_text
            )));
        }

        let reply: AgentResponse = response
            .json()
            .await
            .map_err(|e| Error::Node(format!("Failed to parse agent response: {}", e)))?;

        info!(
            agent_id,
            success = reply.success,
            "Agent response received ({}ms)",
            start.elapsed().as_millis()
        );
        Ok(reply)
    }
}
