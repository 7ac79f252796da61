//! Persistence collaborator for workflows and executions.
//!
//! The engine never owns storage; it reads workflow snapshots and writes
//! results back through [`WorkflowStore`]. [`MemoryStore`] is the bundled
//! implementation used by the CLI and tests.

mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::engine::WorkflowExecution;
use crate::error::Result;
use crate::workflow::{Workflow, WorkflowStatus};

pub use memory::{MemoryStore, MemoryTaskService};

/// Change notifications published by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    WorkflowCreated(String),
    WorkflowUpdated(String),
    WorkflowRemoved(String),
    ExecutionSaved {
        execution_id: String,
        workflow_id: String,
    },
}

/// Filter for [`WorkflowStore::query_workflows`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowQuery {
    pub status: Option<WorkflowStatus>,
    pub created_by: Option<String>,
    pub limit: Option<usize>,
}

impl WorkflowQuery {
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, workflow: &Workflow) -> bool {
        self.status.map_or(true, |s| workflow.status == s)
            && self
                .created_by
                .as_deref()
                .map_or(true, |c| workflow.created_by == c)
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow; fails if the ID exists.
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Replace an existing workflow; fails if the ID is unknown.
    async fn update_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Remove a workflow. Returns whether it existed.
    async fn remove_workflow(&self, id: &str) -> Result<bool>;

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn query_workflows(&self, query: &WorkflowQuery) -> Result<Vec<Workflow>>;

    /// Insert or replace an execution record.
    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<()>;

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>>;

    /// Most recent executions of a workflow, newest first.
    async fn list_executions(&self, workflow_id: &str, limit: usize)
        -> Result<Vec<WorkflowExecution>>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
