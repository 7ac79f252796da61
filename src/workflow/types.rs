//! Workflow graph type definitions.
//!
//! A workflow is a directed graph of typed nodes connected through named
//! ports. The JSON shape (camelCase) is the same one used by the export
//! format, so definitions can move between the authoring UI, storage and
//! the engine without conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Lifecycle state of a workflow definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: WorkflowStatus,

    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,

    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,

    /// Initial execution variables; caller-supplied context wins on collision.
    #[serde(default)]
    pub variables: Map<String, Value>,

    #[serde(default)]
    pub settings: WorkflowSettings,

    #[serde(default)]
    pub execution_count: u64,

    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique node ID within this workflow
    pub id: String,

    /// Node type (trigger, condition, ai-agent, ... or a plugin type)
    #[serde(rename = "type")]
    pub node_type: String,

    /// Canvas position; ignored by execution
    #[serde(default)]
    pub position: Position,

    /// Type-specific configuration
    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub inputs: Vec<Port>,

    #[serde(default)]
    pub outputs: Vec<Port>,
}

impl WorkflowNode {
    /// Create a node with a single `flow` input and output port.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: Position::default(),
            data,
            inputs: vec![Port::flow("input")],
            outputs: vec![Port::flow("output")],
        }
    }

    /// Replace the declared output ports.
    pub fn with_outputs(mut self, outputs: Vec<Port>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Port followed when the executor does not name one.
    pub fn default_exit_port(&self) -> Option<&str> {
        self.outputs.first().map(|p| p.id.as_str())
    }

    /// Variable key this node's output is stored under.
    pub fn output_variable(&self) -> String {
        self.data
            .get("outputVariable")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_output", self.id))
    }
}

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A named, typed connection point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `flow` for control edges; anything else carries data
    #[serde(rename = "type", default = "default_port_type")]
    pub port_type: String,
}

fn default_port_type() -> String {
    "flow".to_string()
}

impl Port {
    pub fn flow(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            port_type: default_port_type(),
        }
    }
}

/// Directed connection from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default = "default_source_port")]
    pub source_port: String,
    #[serde(default = "default_target_port")]
    pub target_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_source_port() -> String {
    "output".to_string()
}

fn default_target_port() -> String {
    "input".to_string()
}

impl WorkflowEdge {
    /// Edge from `source`'s `port` into `target`'s default `input` port.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        port: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_port: port.into(),
            target_port: default_target_port(),
            label: None,
        }
    }
}

/// Global workflow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Maximum run time in milliseconds; `None` disables the limit
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub retry_on_error: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub notify_on_success: bool,

    #[serde(default)]
    pub notify_on_failure: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            retry_on_error: false,
            max_retries: default_max_retries(),
            notify_on_success: false,
            notify_on_failure: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

impl Workflow {
    /// Create an empty draft workflow.
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            status: WorkflowStatus::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: Map::new(),
            settings: WorkflowSettings::default(),
            execution_count: 0,
            last_executed_at: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Add a node; node IDs must be unique.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<()> {
        if node.id.is_empty() {
            return Err(Error::Workflow("Node ID cannot be empty".into()));
        }
        if self.get_node(&node.id).is_some() {
            return Err(Error::Workflow(format!("Duplicate node ID: {}", node.id)));
        }
        self.nodes.push(node);
        self.touch();
        Ok(())
    }

    /// Replace a node's configuration.
    pub fn update_node_data(&mut self, id: &str, data: Value) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::Workflow(format!("Node not found: {}", id)))?;
        node.data = data;
        self.touch();
        Ok(())
    }

    /// Remove a node together with every edge attached to it.
    pub fn remove_node(&mut self, id: &str) -> Result<WorkflowNode> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::Workflow(format!("Node not found: {}", id)))?;
        let node = self.nodes.remove(index);
        self.edges.retain(|e| e.source != id && e.target != id);
        self.touch();
        Ok(node)
    }

    /// Add an edge; both endpoints must already exist.
    pub fn add_edge(&mut self, edge: WorkflowEdge) -> Result<()> {
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(Error::Workflow(format!("Duplicate edge ID: {}", edge.id)));
        }
        for endpoint in [&edge.source, &edge.target] {
            if self.get_node(endpoint).is_none() {
                return Err(Error::Workflow(format!(
                    "Edge '{}' references non-existent node '{}'",
                    edge.id, endpoint
                )));
            }
        }
        self.edges.push(edge);
        self.touch();
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<WorkflowEdge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::Workflow(format!("Edge not found: {}", id)))?;
        let edge = self.edges.remove(index);
        self.touch();
        Ok(edge)
    }

    /// Nodes a run starts from.
    ///
    /// All `trigger` nodes; without any, every node that has no incoming edge.
    pub fn entry_nodes(&self) -> Vec<&WorkflowNode> {
        let triggers: Vec<&WorkflowNode> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == crate::nodes::TRIGGER)
            .collect();
        if !triggers.is_empty() {
            return triggers;
        }

        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.target == n.id))
            .collect()
    }

    /// Edges leaving `node_id` through `port`, in declaration order.
    pub fn outgoing_edges<'a>(
        &'a self,
        node_id: &'a str,
        port: &'a str,
    ) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == node_id && e.source_port == port)
    }

    pub fn activate(&mut self) {
        self.set_status(WorkflowStatus::Active);
    }

    pub fn pause(&mut self) {
        self.set_status(WorkflowStatus::Paused);
    }

    pub fn archive(&mut self) {
        self.set_status(WorkflowStatus::Archived);
    }

    fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Get all node types used in this workflow.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.nodes.iter().map(|n| n.node_type.as_str()).collect();
        types.sort();
        types.dedup();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Workflow {
        let mut wf = Workflow::new("sample", "user-1");
        wf.add_node(WorkflowNode::new("start", "trigger", json!({})))
            .unwrap();
        wf.add_node(WorkflowNode::new("work", "task", json!({"title": "t"})))
            .unwrap();
        wf.add_edge(WorkflowEdge::new("e1", "start", "output", "work"))
            .unwrap();
        wf
    }

    #[test]
    fn test_new_workflow_is_draft() {
        let wf = Workflow::new("x", "user-1");
        assert_eq!(wf.status, WorkflowStatus::Draft);
        assert_eq!(wf.execution_count, 0);
        assert!(!wf.id.is_empty());
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut wf = sample();
        let err = wf
            .add_node(WorkflowNode::new("start", "action", json!({})))
            .unwrap_err();
        assert!(err.to_string().contains("start"));
    }

    #[test]
    fn test_add_edge_rejects_unknown_endpoint() {
        let mut wf = sample();
        let err = wf
            .add_edge(WorkflowEdge::new("e2", "work", "output", "ghost"))
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_remove_node_drops_attached_edges() {
        let mut wf = sample();
        wf.remove_node("work").unwrap();
        assert_eq!(wf.nodes.len(), 1);
        assert!(wf.edges.is_empty());
    }

    #[test]
    fn test_entry_nodes_prefers_triggers() {
        let wf = sample();
        let entries: Vec<&str> = wf.entry_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(entries, vec!["start"]);
    }

    #[test]
    fn test_entry_nodes_falls_back_to_roots() {
        let mut wf = Workflow::new("roots", "user-1");
        wf.add_node(WorkflowNode::new("a", "action", json!({})))
            .unwrap();
        wf.add_node(WorkflowNode::new("b", "action", json!({})))
            .unwrap();
        wf.add_edge(WorkflowEdge::new("e", "a", "output", "b"))
            .unwrap();
        let entries: Vec<&str> = wf.entry_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(entries, vec!["a"]);
    }

    #[test]
    fn test_output_variable_key() {
        let configured = WorkflowNode::new("n1", "task", json!({"outputVariable": "created"}));
        assert_eq!(configured.output_variable(), "created");
        let derived = WorkflowNode::new("n2", "task", json!({}));
        assert_eq!(derived.output_variable(), "n2_output");
    }

    #[test]
    fn test_camel_case_serialization() {
        let wf = sample();
        let value = serde_json::to_value(&wf).unwrap();
        assert!(value.get("executionCount").is_some());
        assert_eq!(value["edges"][0]["sourcePort"], "output");
        assert_eq!(value["settings"]["maxRetries"], 3);
        assert_eq!(value["status"], "draft");
    }
}
