//! Workflow executor - walks the node graph breadth-first.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn, Span};

use super::execution::{ExecutionErrorKind, LogLevel, WorkflowExecution};
use super::services::EngineServices;
use crate::error::{Error, Result};
use crate::nodes::{NodeContext, NodeExecutor, NodeOutput, NodeRegistry};
use crate::plugins::Plugin;
use crate::workflow::{Workflow, WorkflowNode, WorkflowSettings};

/// Reason a walk stopped early.
#[derive(Debug)]
struct WalkFailure {
    kind: ExecutionErrorKind,
    message: String,
    node_id: Option<String>,
}

impl WalkFailure {
    fn new(kind: ExecutionErrorKind, message: String, node_id: Option<String>) -> Self {
        Self {
            kind,
            message,
            node_id,
        }
    }
}

/// Runs workflows.
///
/// Each engine owns its node resolution table and services; nothing is
/// process-global, so independent engines can run side by side.
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: NodeRegistry,
    services: EngineServices,
    default_timeout_ms: Option<u64>,
}

impl ExecutionEngine {
    /// Create an engine with the built-in node types and no services.
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::new(),
            services: EngineServices::default(),
            default_timeout_ms: None,
        }
    }

    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a plugin. Its tools become available to agent nodes.
    pub fn with_plugin(mut self, plugin: &dyn Plugin) -> Self {
        self.registry.register_plugin(plugin);
        self
    }

    pub fn with_services(mut self, services: EngineServices) -> Self {
        self.services = services;
        self
    }

    /// Timeout for workflows that do not set `settings.timeout`.
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Execute a workflow.
    ///
    /// `context` is merged over the workflow's own variables (caller wins).
    /// Failures inside the run are reported on the returned execution; only
    /// a workflow with no nodes is rejected outright.
    #[instrument(
        name = "workflow.execute",
        skip(self, workflow, context),
        fields(
            workflow_id = %workflow.id,
            workflow_name = %workflow.name,
            triggered_by = %triggered_by,
            execution_id = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        triggered_by: &str,
        context: Map<String, Value>,
    ) -> Result<WorkflowExecution> {
        if workflow.nodes.is_empty() {
            return Err(Error::EmptyWorkflow(workflow.id.clone()));
        }

        let mut variables = workflow.variables.clone();
        variables.extend(context);

        let mut execution = WorkflowExecution::start(&workflow.id, triggered_by, variables);
        Span::current().record("execution_id", execution.id.as_str());

        info!(
            "Starting execution {} of workflow '{}'",
            execution.id, workflow.name
        );
        execution.log(
            LogLevel::Info,
            None,
            format!("Execution started by {}", triggered_by),
            None,
        );

        let timeout_ms = workflow.settings.timeout.or(self.default_timeout_ms);
        let walked = match timeout_ms {
            Some(ms) => timeout(Duration::from_millis(ms), self.walk(workflow, &mut execution))
                .await
                .ok(),
            None => Some(self.walk(workflow, &mut execution).await),
        };

        match walked {
            Some(Ok(())) => execution.complete(),
            Some(Err(failure)) => {
                execution.fail(failure.kind, failure.message, failure.node_id);
            }
            None => {
                let node_id = execution.context.current_node_id.clone();
                execution.fail(
                    ExecutionErrorKind::Timeout,
                    format!(
                        "Workflow timed out after {}ms",
                        timeout_ms.unwrap_or_default()
                    ),
                    node_id,
                );
            }
        }

        match &execution.error {
            None => info!(
                "Execution {} completed in {}ms",
                execution.id,
                execution.duration.unwrap_or_default()
            ),
            Some(e) => error!(
                kind = ?e.kind,
                "Execution {} failed: {}",
                execution.id, e.message
            ),
        }

        Ok(execution)
    }

    async fn walk(
        &self,
        workflow: &Workflow,
        execution: &mut WorkflowExecution,
    ) -> std::result::Result<(), WalkFailure> {
        let entries = workflow.entry_nodes();
        if entries.is_empty() {
            return Err(WalkFailure::new(
                ExecutionErrorKind::NoEntryPoint,
                "Workflow has no trigger node and every node has an incoming edge".to_string(),
                None,
            ));
        }

        let mut queue: VecDeque<&WorkflowNode> = entries.into_iter().collect();
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.id.as_str()) {
                continue;
            }
            execution.context.current_node_id = Some(node.id.clone());

            let Some(executor) = self.registry.resolve(&node.node_type) else {
                return Err(WalkFailure::new(
                    ExecutionErrorKind::UnknownNodeType,
                    format!("Unknown node type: {}", node.node_type),
                    Some(node.id.clone()),
                ));
            };

            info!("Executing node '{}' [{}]", node.id, node.node_type);
            execution.log(
                LogLevel::Info,
                Some(node.id.as_str()),
                format!("Executing node '{}' [{}]", node.id, node.node_type),
                None,
            );

            let ctx = NodeContext {
                execution_id: execution.id.clone(),
                workflow_id: workflow.id.clone(),
                node_id: node.id.clone(),
                triggered_by: execution.triggered_by.clone(),
                variables: execution.context.variables.clone(),
                node_results: execution.context.node_results.clone(),
                services: self.node_services(),
            };

            let output =
                execute_node_with_retry(executor, node, &ctx, &workflow.settings, execution).await?;

            let NodeOutput {
                data,
                port,
                variables,
            } = output;
            let port = port.or_else(|| node.default_exit_port().map(str::to_string));

            execution.context.variables.extend(variables);
            execution
                .context
                .variables
                .insert(node.output_variable(), data.clone());
            execution
                .context
                .node_results
                .insert(node.id.clone(), data);
            execution.log(
                LogLevel::Info,
                Some(node.id.as_str()),
                format!("Node '{}' completed", node.id),
                port.as_ref().map(|p| json!({ "port": p })),
            );

            if node.outputs.is_empty() {
                debug!("Node '{}' has no outputs; branch ends", node.id);
                continue;
            }
            let Some(port) = port else {
                continue;
            };

            for edge in workflow.outgoing_edges(&node.id, &port) {
                match workflow.get_node(&edge.target) {
                    Some(next) => queue.push_back(next),
                    None => {
                        warn!(
                            "Edge '{}' targets missing node '{}'; skipping",
                            edge.id, edge.target
                        );
                        execution.log(
                            LogLevel::Warn,
                            Some(node.id.as_str()),
                            format!("Edge '{}' targets missing node '{}'", edge.id, edge.target),
                            None,
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Services handed to nodes, with plugin tools folded in.
    fn node_services(&self) -> EngineServices {
        let mut services = self.services.clone();
        for name in self.registry.tools().list() {
            if !services.tools.has(name) {
                if let Some(tool) = self.registry.tools().get(name) {
                    services.tools.register(tool);
                }
            }
        }
        services
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a node, retrying immediately on failure when the workflow allows it.
///
/// Total attempts are `1 + maxRetries` with `retryOnError`, otherwise one.
#[instrument(
    name = "node.execute",
    skip_all,
    fields(node_id = %node.id, node_type = %node.node_type)
)]
async fn execute_node_with_retry(
    executor: Arc<dyn NodeExecutor>,
    node: &WorkflowNode,
    ctx: &NodeContext,
    settings: &WorkflowSettings,
    execution: &mut WorkflowExecution,
) -> std::result::Result<NodeOutput, WalkFailure> {
    let max_attempts = if settings.retry_on_error {
        settings.max_retries.saturating_add(1)
    } else {
        1
    };
    let mut attempt = 1u32;

    loop {
        match executor.execute(&node.data, ctx).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                execution.log(
                    LogLevel::Error,
                    Some(node.id.as_str()),
                    format!(
                        "Node '{}' failed (attempt {}/{}): {}",
                        node.id, attempt, max_attempts, e
                    ),
                    None,
                );

                if attempt >= max_attempts {
                    error!("Node '{}' failed: {}", node.id, e);
                    return Err(WalkFailure::new(
                        ExecutionErrorKind::NodeExecutionError,
                        format!("Node '{}' failed: {}", node.id, e),
                        Some(node.id.clone()),
                    ));
                }

                warn!(
                    "Node '{}' attempt {}/{} failed: {}. Retrying",
                    node.id, attempt, max_attempts, e
                );
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
