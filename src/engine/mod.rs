//! Execution engine for workflows.

mod execution;
mod executor;
mod runner;
mod services;

pub use execution::{
    ExecutionContext, ExecutionError, ExecutionErrorKind, ExecutionLog, ExecutionStatus, LogLevel,
    WorkflowExecution,
};
pub use executor::ExecutionEngine;
pub use runner::{ExecutionLauncher, WorkflowRunner};
pub use services::{
    AgentResponse, AgentService, EngineServices, HttpAgentClient, Notifier, TaskDraft, TaskService,
};
