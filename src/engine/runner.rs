//! Runs stored workflows and records the results.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::execution::WorkflowExecution;
use super::executor::ExecutionEngine;
use super::services::Notifier;
use crate::error::{Error, Result};
use crate::storage::WorkflowStore;
use crate::workflow::{Workflow, WorkflowStatus};

/// Starts a workflow by ID. Event triggers and the scheduler launch
/// through this.
#[async_trait]
pub trait ExecutionLauncher: Send + Sync {
    async fn launch(
        &self,
        workflow_id: &str,
        triggered_by: &str,
        context: Map<String, Value>,
    ) -> Result<WorkflowExecution>;
}

/// Loads workflows from a store, executes them, and writes back the
/// execution record and bookkeeping.
pub struct WorkflowRunner {
    store: Arc<dyn WorkflowStore>,
    engine: Arc<ExecutionEngine>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl WorkflowRunner {
    pub fn new(store: Arc<dyn WorkflowStore>, engine: Arc<ExecutionEngine>) -> Self {
        Self {
            store,
            engine,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Execute a workflow snapshot regardless of status and persist the result.
    pub async fn run(
        &self,
        workflow: &Workflow,
        triggered_by: &str,
        context: Map<String, Value>,
    ) -> Result<WorkflowExecution> {
        let execution = self.engine.execute(workflow, triggered_by, context).await?;
        self.store.save_execution(&execution).await?;
        self.record_run(&workflow.id, &execution).await?;
        self.notify(workflow, &execution).await;
        Ok(execution)
    }

    async fn record_run(&self, workflow_id: &str, execution: &WorkflowExecution) -> Result<()> {
        // Re-read so concurrent edits to the definition are not overwritten.
        let Some(mut latest) = self.store.get_workflow(workflow_id).await? else {
            warn!(workflow_id, "Workflow removed during execution; skipping bookkeeping");
            return Ok(());
        };
        latest.execution_count = latest.execution_count.saturating_add(1);
        latest.last_executed_at = Some(execution.started_at);
        self.store.update_workflow(&latest).await
    }

    async fn notify(&self, workflow: &Workflow, execution: &WorkflowExecution) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let wanted = if execution.is_success() {
            workflow.settings.notify_on_success
        } else {
            workflow.settings.notify_on_failure
        };
        if !wanted {
            return;
        }
        if let Err(e) = notifier.notify(workflow, execution).await {
            warn!(
                workflow_id = %workflow.id,
                execution_id = %execution.id,
                "Notification failed: {}", e
            );
        }
    }
}

#[async_trait]
impl ExecutionLauncher for WorkflowRunner {
    async fn launch(
        &self,
        workflow_id: &str,
        triggered_by: &str,
        context: Map<String, Value>,
    ) -> Result<WorkflowExecution> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| Error::WorkflowNotFound(workflow_id.to_string()))?;

        if workflow.status != WorkflowStatus::Active {
            return Err(Error::Workflow(format!(
                "Workflow '{}' is {}, not active",
                workflow.name, workflow.status
            )));
        }

        info!(workflow_id, triggered_by, "Launching workflow");
        self.run(&workflow, triggered_by, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::workflow::WorkflowNode;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _workflow: &Workflow, execution: &WorkflowExecution) -> Result<()> {
            self.seen.lock().unwrap().push(execution.status.to_string());
            Ok(())
        }
    }

    async fn stored_workflow(store: &MemoryStore, active: bool) -> Workflow {
        let mut wf = Workflow::new("Noop", "user1");
        wf.add_node(WorkflowNode::new("t", "trigger", json!({}))).unwrap();
        if active {
            wf.activate();
        }
        store.create_workflow(&wf).await.unwrap();
        wf
    }

    #[tokio::test]
    async fn test_launch_records_execution_and_bookkeeping() {
        let store = Arc::new(MemoryStore::new());
        let wf = stored_workflow(&store, true).await;
        let runner = WorkflowRunner::new(store.clone(), Arc::new(ExecutionEngine::new()));

        let execution = runner.launch(&wf.id, "system", Map::new()).await.unwrap();

        assert!(execution.is_success());
        assert!(store.get_execution(&execution.id).await.unwrap().is_some());
        let updated = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(updated.execution_count, 1);
        assert_eq!(updated.last_executed_at, Some(execution.started_at));
        assert_eq!(updated.nodes, wf.nodes);
    }

    #[tokio::test]
    async fn test_launch_refuses_inactive_and_missing() {
        let store = Arc::new(MemoryStore::new());
        let wf = stored_workflow(&store, false).await;
        let runner = WorkflowRunner::new(store.clone(), Arc::new(ExecutionEngine::new()));

        assert!(runner.launch(&wf.id, "system", Map::new()).await.is_err());
        assert!(matches!(
            runner.launch("nope", "system", Map::new()).await,
            Err(Error::WorkflowNotFound(_))
        ));
        assert!(store.list_executions(&wf.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_respects_settings() {
        let store = Arc::new(MemoryStore::new());
        let mut wf = Workflow::new("Notify", "user1");
        wf.add_node(WorkflowNode::new("t", "trigger", json!({}))).unwrap();
        wf.settings.notify_on_success = true;
        store.create_workflow(&wf).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let runner = WorkflowRunner::new(store.clone(), Arc::new(ExecutionEngine::new()))
            .with_notifier(notifier.clone());

        runner.run(&wf, "user1", Map::new()).await.unwrap();
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["success".to_string()]);
    }
}
