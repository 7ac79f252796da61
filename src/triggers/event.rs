//! Event triggers - start workflows when domain events match.
//!
//! Each workflow registers a set of [`EventTriggerConfig`]s. An incoming
//! [`WorkflowEvent`] launches every workflow with at least one enabled
//! trigger of the same event type whose filters accept the event's entity.
//! A workflow launches at most once per event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::ExecutionLauncher;

/// Domain events a workflow can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.status_changed")]
    TaskStatusChanged,
    #[serde(rename = "task.assigned")]
    TaskAssigned,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "project.created")]
    ProjectCreated,
    #[serde(rename = "project.updated")]
    ProjectUpdated,
    #[serde(rename = "project.archived")]
    ProjectArchived,
    #[serde(rename = "project.deleted")]
    ProjectDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskCreated => "task.created",
            EventType::TaskUpdated => "task.updated",
            EventType::TaskStatusChanged => "task.status_changed",
            EventType::TaskAssigned => "task.assigned",
            EventType::TaskCompleted => "task.completed",
            EventType::TaskDeleted => "task.deleted",
            EventType::ProjectCreated => "project.created",
            EventType::ProjectUpdated => "project.updated",
            EventType::ProjectArchived => "project.archived",
            EventType::ProjectDeleted => "project.deleted",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity filters. Categories are ANDed; values within one category are
/// ORed. An empty category accepts anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignee: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TriggerFilters {
    /// Whether an entity snapshot passes every non-empty category.
    pub fn matches(&self, entity: &Value) -> bool {
        category_matches(&self.status, entity, &["status"])
            && category_matches(&self.priority, entity, &["priority"])
            && category_matches(&self.assignee, entity, &["assignee", "assigneeId"])
            && category_matches(&self.project, entity, &["project", "projectId"])
            && category_matches(&self.tags, entity, &["tags"])
    }
}

/// A string attribute must be in `allowed`; an array attribute must
/// intersect it. A missing attribute fails.
fn category_matches(allowed: &[String], entity: &Value, keys: &[&str]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(attribute) = keys.iter().find_map(|k| entity.get(*k)) else {
        return false;
    };
    match attribute {
        Value::String(s) => allowed.iter().any(|a| a == s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| allowed.iter().any(|a| a == s)),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTriggerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<TriggerFilters>,
}

fn default_enabled() -> bool {
    true
}

impl EventTriggerConfig {
    pub fn new(event_type: EventType) -> Self {
        Self {
            enabled: true,
            event_type,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: TriggerFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn matches(&self, event: &WorkflowEvent) -> bool {
        self.enabled
            && self.event_type == event.event_type
            && self
                .filters
                .as_ref()
                .map_or(true, |f| f.matches(&event.entity))
    }
}

/// A domain event with a snapshot of the entity that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub entity: Value,
}

impl WorkflowEvent {
    pub fn new(event_type: EventType, entity: Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data: Value::Null,
            entity,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Who caused the event: `data.triggeredBy`, then `entity.createdBy`,
    /// then `"system"`.
    pub fn triggered_by(&self) -> String {
        let non_empty = |v: &Value, key: &str| -> Option<String> {
            v.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        non_empty(&self.data, "triggeredBy")
            .or_else(|| non_empty(&self.entity, "createdBy"))
            .unwrap_or_else(|| "system".to_string())
    }

    /// Variables handed to the execution.
    pub fn to_context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert(
            "event".to_string(),
            json!({
                "type": self.event_type,
                "timestamp": self.timestamp,
                "data": self.data,
            }),
        );
        context.insert("entity".to_string(), self.entity.clone());
        context
    }
}

/// Result of launching one matched workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub workflow_id: String,
    pub result: std::result::Result<String, String>,
}

/// Per-workflow event triggers.
pub struct EventTriggerRegistry {
    triggers: RwLock<HashMap<String, Vec<EventTriggerConfig>>>,
    launcher: Arc<dyn ExecutionLauncher>,
}

impl EventTriggerRegistry {
    pub fn new(launcher: Arc<dyn ExecutionLauncher>) -> Self {
        Self {
            triggers: RwLock::new(HashMap::new()),
            launcher,
        }
    }

    /// Replace a workflow's triggers. Disabled triggers are dropped.
    pub async fn register_triggers(&self, workflow_id: &str, triggers: Vec<EventTriggerConfig>) {
        let enabled: Vec<EventTriggerConfig> = triggers.into_iter().filter(|t| t.enabled).collect();
        let mut map = self.triggers.write().await;
        if enabled.is_empty() {
            map.remove(workflow_id);
            debug!(workflow_id, "No enabled event triggers; workflow unregistered");
        } else {
            info!(workflow_id, count = enabled.len(), "Event triggers registered");
            map.insert(workflow_id.to_string(), enabled);
        }
    }

    /// Remove a workflow's triggers. Returns whether any were registered.
    pub async fn unregister_triggers(&self, workflow_id: &str) -> bool {
        self.triggers.write().await.remove(workflow_id).is_some()
    }

    pub async fn triggers_for(&self, workflow_id: &str) -> Vec<EventTriggerConfig> {
        self.triggers
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn workflow_count(&self) -> usize {
        self.triggers.read().await.len()
    }

    /// Workflows that an event would launch, sorted by ID.
    pub async fn matching_workflows(&self, event: &WorkflowEvent) -> Vec<String> {
        let triggers = self.triggers.read().await;
        let mut matched: Vec<String> = triggers
            .iter()
            .filter(|(_, configs)| configs.iter().any(|c| c.matches(event)))
            .map(|(id, _)| id.clone())
            .collect();
        matched.sort();
        matched
    }

    /// Launch every matching workflow. One failing launch never stops the
    /// others.
    pub async fn handle_event(&self, event: &WorkflowEvent) -> Vec<TriggerOutcome> {
        let matched = self.matching_workflows(event).await;
        if matched.is_empty() {
            debug!(event_type = %event.event_type, "No workflows matched event");
            return Vec::new();
        }

        let triggered_by = event.triggered_by();
        let mut outcomes = Vec::with_capacity(matched.len());
        for workflow_id in matched {
            let result = match self
                .launcher
                .launch(&workflow_id, &triggered_by, event.to_context())
                .await
            {
                Ok(execution) => {
                    debug!(
                        workflow_id = %workflow_id,
                        execution_id = %execution.id,
                        "Event launched workflow"
                    );
                    Ok(execution.id)
                }
                Err(e) => {
                    error!(
                        workflow_id = %workflow_id,
                        event_type = %event.event_type,
                        "Failed to launch workflow for event: {}", e
                    );
                    Err(e.to_string())
                }
            };
            outcomes.push(TriggerOutcome {
                workflow_id,
                result,
            });
        }
        outcomes
    }
}

/// Feeds events from a broadcast channel into the registry.
pub struct EventListener {
    registry: Arc<EventTriggerRegistry>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EventListener {
    pub fn new(registry: Arc<EventTriggerRegistry>) -> Self {
        Self {
            registry,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Start consuming events.
    pub fn start(&mut self, mut receiver: broadcast::Receiver<WorkflowEvent>) {
        if self.handle.is_some() {
            warn!("Event listener already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Event listener received shutdown signal");
                        break;
                    }
                    result = receiver.recv() => {
                        match result {
                            Ok(event) => {
                                debug!("Received event: {}", event.event_type);
                                registry.handle_event(&event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Event listener lagged; {} event(s) dropped", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        self.handle = Some(handle);
        info!("Event listener started");
    }

    /// Stop the listener and wait for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Event listener task failed: {}", e);
            }
        }
        info!("Event listener stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
