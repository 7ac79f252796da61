//! In-memory store and task service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::debug;

use super::{StoreEvent, WorkflowQuery, WorkflowStore};
use crate::engine::{TaskDraft, TaskService, WorkflowExecution};
use crate::error::{Error, Result};
use crate::workflow::Workflow;

const EVENT_CAPACITY: usize = 256;

/// Default query limit.
const DEFAULT_QUERY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct MemoryStore {
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
    executions: Arc<RwLock<HashMap<String, WorkflowExecution>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            executions: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(Error::Storage(format!(
                "Workflow '{}' already exists",
                workflow.id
            )));
        }
        workflows.insert(workflow.id.clone(), workflow.clone());
        drop(workflows);

        debug!(workflow_id = %workflow.id, "Workflow created");
        self.publish(StoreEvent::WorkflowCreated(workflow.id.clone()));
        Ok(())
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let Some(existing) = workflows.get_mut(&workflow.id) else {
            return Err(Error::WorkflowNotFound(workflow.id.clone()));
        };
        *existing = workflow.clone();
        existing.updated_at = Utc::now();
        drop(workflows);

        self.publish(StoreEvent::WorkflowUpdated(workflow.id.clone()));
        Ok(())
    }

    async fn remove_workflow(&self, id: &str) -> Result<bool> {
        let removed = self.workflows.write().await.remove(id).is_some();
        if removed {
            self.publish(StoreEvent::WorkflowRemoved(id.to_string()));
        }
        Ok(removed)
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn query_workflows(&self, query: &WorkflowQuery) -> Result<Vec<Workflow>> {
        let workflows = self.workflows.read().await;
        let mut matched: Vec<Workflow> = workflows
            .values()
            .filter(|w| query.matches(w))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        matched.truncate(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
        Ok(matched)
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        self.publish(StoreEvent::ExecutionSaved {
            execution_id: execution.id.clone(),
            workflow_id: execution.workflow_id.clone(),
        });
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        let mut matched: Vec<WorkflowExecution> = executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matched.truncate(limit);
        Ok(matched)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// Task service that keeps created tasks in memory.
#[derive(Default)]
pub struct MemoryTaskService {
    tasks: Mutex<Vec<Value>>,
}

impl MemoryTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks created so far, oldest first.
    pub async fn created(&self) -> Vec<Value> {
        self.tasks.lock().await.clone()
    }
}

#[async_trait]
impl TaskService for MemoryTaskService {
    async fn create_task(&self, task: TaskDraft) -> Result<Value> {
        let mut value = serde_json::to_value(&task)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
            map.insert("createdAt".to_string(), serde_json::to_value(Utc::now())?);
        }
        self.tasks.lock().await.push(value.clone());
        Ok(value)
    }
}
