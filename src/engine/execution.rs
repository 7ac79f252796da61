//! Execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in an execution's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Mutable state of a running execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub variables: Map<String, Value>,
    pub node_results: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
}

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionErrorKind {
    /// No trigger node and no node without incoming edges
    NoEntryPoint,
    /// Neither a built-in nor a plugin executor handles the node type
    UnknownNodeType,
    /// A node failed after exhausting its retries
    NodeExecutionError,
    /// The workflow's timeout elapsed
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// A single run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds from start to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub context: ExecutionContext,
    #[serde(default)]
    pub logs: Vec<ExecutionLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl WorkflowExecution {
    /// Start a new running execution.
    pub fn start(workflow_id: &str, triggered_by: &str, variables: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Running,
            triggered_by: triggered_by.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            context: ExecutionContext {
                variables,
                ..Default::default()
            },
            logs: Vec::new(),
            error: None,
        }
    }

    /// Append a log entry.
    pub fn log(
        &mut self,
        level: LogLevel,
        node_id: Option<&str>,
        message: impl Into<String>,
        data: Option<Value>,
    ) {
        self.logs.push(ExecutionLog {
            timestamp: Utc::now(),
            level,
            node_id: node_id.map(str::to_string),
            message: message.into(),
            data,
        });
    }

    /// Mark the execution successful.
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Success;
        self.finish();
        self.log(LogLevel::Info, None, "Execution completed", None);
    }

    /// Mark the execution failed.
    pub fn fail(&mut self, kind: ExecutionErrorKind, message: String, node_id: Option<String>) {
        self.status = ExecutionStatus::Failed;
        if node_id.is_some() {
            self.context.current_node_id = node_id.clone();
        }
        self.log(LogLevel::Error, node_id.as_deref(), message.clone(), None);
        self.error = Some(ExecutionError {
            kind,
            message,
            node_id,
        });
        self.finish();
    }

    fn finish(&mut self) {
        let completed_at = Utc::now();
        self.duration = Some((completed_at - self.started_at).num_milliseconds());
        self.completed_at = Some(completed_at);
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Kind of failure, if the execution failed.
    pub fn error_kind(&self) -> Option<ExecutionErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Log entries attached to a node.
    pub fn node_logs<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a ExecutionLog> + 'a {
        self.logs
            .iter()
            .filter(move |log| log.node_id.as_deref() == Some(node_id))
    }
}
