//! Portable export/import of workflow graphs.
//!
//! Exports drop everything instance-specific (id, creator, timestamps,
//! execution bookkeeping); imports regenerate it. An imported workflow is
//! always a draft, whatever status it was exported with.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{Workflow, WorkflowEdge, WorkflowNode, WorkflowSettings, WorkflowStatus};
use super::validator::validate_export;
use crate::error::{Error, Result};

/// Export format version written by this crate.
pub const EXPORT_VERSION: &str = "1.0";

/// Single-workflow export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExport {
    pub version: String,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    pub workflow: ExportedWorkflow,
}

/// The portable part of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Informational only; imports are always drafts
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: WorkflowStatus,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

/// Unknown or malformed statuses read as draft.
fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<WorkflowStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Multi-workflow export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExport {
    pub version: String,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    pub count: usize,
    pub workflows: Vec<ExportedWorkflow>,
}

/// Options controlling [`import_workflow`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Assign fresh node and edge IDs (default: true)
    pub regenerate_ids: bool,
    /// Run [`validate_export`] first and refuse invalid documents (default: true)
    pub validate: bool,
    pub name_override: Option<String>,
    pub description_override: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            regenerate_ids: true,
            validate: true,
            name_override: None,
            description_override: None,
        }
    }
}

impl ImportOptions {
    /// Keep node and edge IDs verbatim. Collisions are the caller's problem.
    pub fn keep_ids(mut self) -> Self {
        self.regenerate_ids = false;
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description_override = Some(description.into());
        self
    }
}

impl From<&Workflow> for ExportedWorkflow {
    fn from(workflow: &Workflow) -> Self {
        Self {
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            status: workflow.status,
            nodes: workflow.nodes.clone(),
            edges: workflow.edges.clone(),
            variables: workflow.variables.clone(),
            settings: workflow.settings.clone(),
        }
    }
}

/// Export a workflow to its portable form.
pub fn export_workflow(workflow: &Workflow) -> WorkflowExport {
    WorkflowExport {
        version: EXPORT_VERSION.to_string(),
        exported_at: Utc::now(),
        workflow: ExportedWorkflow::from(workflow),
    }
}

/// Export several workflows into one batch document.
pub fn export_multiple(workflows: &[Workflow]) -> BatchExport {
    BatchExport {
        version: EXPORT_VERSION.to_string(),
        exported_at: Utc::now(),
        count: workflows.len(),
        workflows: workflows.iter().map(ExportedWorkflow::from).collect(),
    }
}

/// Import a workflow from an export document.
///
/// With validation enabled, any validation error aborts the import and the
/// complete error list is returned as [`Error::InvalidExport`].
pub fn import_workflow(
    exported: &Value,
    creator_id: &str,
    options: &ImportOptions,
) -> Result<Workflow> {
    if options.validate {
        let report = validate_export(exported);
        if !report.valid {
            return Err(Error::InvalidExport(report.errors));
        }
        for warning in &report.warnings {
            warn!("Import warning: {}", warning);
        }
    }

    let export: WorkflowExport = serde_json::from_value(exported.clone()).map_err(|e| {
        let message = format!("Malformed workflow export: {}", e);
        if options.validate {
            Error::InvalidExport(vec![message])
        } else {
            Error::Parse(message)
        }
    })?;
    let source = export.workflow;

    let node_ids: HashMap<String, String> = source
        .nodes
        .iter()
        .map(|n| {
            let new_id = if options.regenerate_ids {
                uuid::Uuid::new_v4().to_string()
            } else {
                n.id.clone()
            };
            (n.id.clone(), new_id)
        })
        .collect();

    let nodes = source
        .nodes
        .into_iter()
        .map(|mut node| {
            if let Some(new_id) = node_ids.get(&node.id) {
                node.id = new_id.clone();
            }
            node
        })
        .collect();

    // Endpoints missing from the map keep their original (stale) ID.
    let edges = source
        .edges
        .into_iter()
        .map(|mut edge| {
            if options.regenerate_ids {
                edge.id = uuid::Uuid::new_v4().to_string();
            }
            edge.source = remap(&node_ids, edge.source);
            edge.target = remap(&node_ids, edge.target);
            edge
        })
        .collect();

    let mut workflow = Workflow::new(
        options.name_override.clone().unwrap_or(source.name),
        creator_id,
    );
    workflow.description = options
        .description_override
        .clone()
        .unwrap_or(source.description);
    workflow.status = WorkflowStatus::Draft;
    workflow.nodes = nodes;
    workflow.edges = edges;
    workflow.variables = source.variables;
    workflow.settings = source.settings;

    debug!(
        "Imported workflow '{}' ({} nodes, {} edges)",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len()
    );

    Ok(workflow)
}

fn remap(ids: &HashMap<String, String>, id: String) -> String {
    match ids.get(&id) {
        Some(new_id) => new_id.clone(),
        None => id,
    }
}

/// Import every workflow of a batch document independently.
///
/// Fails only when the document is not a batch at all; per-workflow
/// failures are reported in the returned list.
pub fn import_multiple(
    batch: &Value,
    creator_id: &str,
    options: &ImportOptions,
) -> Result<Vec<Result<Workflow>>> {
    let workflows = batch
        .get("workflows")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("Batch export must contain a workflows array".into()))?;
    let version = batch
        .get("version")
        .cloned()
        .unwrap_or(Value::Null);
    let exported_at = batch
        .get("exportedAt")
        .cloned()
        .unwrap_or(Value::Null);

    Ok(workflows
        .iter()
        .map(|workflow| {
            let mut single = serde_json::json!({
                "version": version,
                "workflow": workflow,
            });
            if !exported_at.is_null() {
                single["exportedAt"] = exported_at.clone();
            }
            import_workflow(&single, creator_id, options)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Port;
    use serde_json::json;

    fn sample_workflow() -> Workflow {
        let mut wf = Workflow::new("Escalate", "user-1");
        wf.description = "Escalate urgent tasks".into();
        wf.status = WorkflowStatus::Active;
        wf.execution_count = 7;
        wf.add_node(WorkflowNode::new("t", "trigger", json!({})))
            .unwrap();
        wf.add_node(
            WorkflowNode::new("c", "condition", json!({"field": "${priority}", "operator": "equals", "value": "high"}))
                .with_outputs(vec![Port::flow("true"), Port::flow("false")]),
        )
        .unwrap();
        wf.add_node(WorkflowNode::new("a", "task", json!({"title": "Urgent"})))
            .unwrap();
        wf.add_node(WorkflowNode::new("b", "task", json!({"title": "Normal"})))
            .unwrap();
        wf.add_edge(WorkflowEdge::new("e1", "t", "output", "c"))
            .unwrap();
        wf.add_edge(WorkflowEdge::new("e2", "c", "true", "a"))
            .unwrap();
        wf.add_edge(WorkflowEdge::new("e3", "c", "false", "b"))
            .unwrap();
        wf
    }

    /// Edges as (source type+index, port, target type+index), independent of IDs.
    fn topology(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Vec<(usize, String, usize)> {
        let index = |id: &str| nodes.iter().position(|n| n.id == id).unwrap();
        let mut out: Vec<_> = edges
            .iter()
            .map(|e| (index(&e.source), e.source_port.clone(), index(&e.target)))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_export_omits_instance_fields() {
        let export = serde_json::to_value(export_workflow(&sample_workflow())).unwrap();
        assert_eq!(export["version"], EXPORT_VERSION);
        assert!(export.get("exportedAt").is_some());
        let wf = &export["workflow"];
        assert!(wf.get("id").is_none());
        assert!(wf.get("createdBy").is_none());
        assert!(wf.get("createdAt").is_none());
        assert!(wf.get("executionCount").is_none());
        assert_eq!(wf["nodes"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_round_trip_preserves_topology() {
        let original = sample_workflow();
        let exported = serde_json::to_value(export_workflow(&original)).unwrap();
        let imported = import_workflow(&exported, "user-2", &ImportOptions::default()).unwrap();
        let again = export_workflow(&imported);

        assert_eq!(again.workflow.nodes.len(), original.nodes.len());
        assert_eq!(again.workflow.edges.len(), original.edges.len());
        let types: Vec<&str> = again.workflow.nodes.iter().map(|n| n.node_type.as_str()).collect();
        let original_types: Vec<&str> =
            original.nodes.iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, original_types);
        assert_eq!(
            topology(&again.workflow.nodes, &again.workflow.edges),
            topology(&original.nodes, &original.edges)
        );
    }

    #[test]
    fn test_import_regenerates_ids_and_resets_status() {
        let original = sample_workflow();
        let exported = serde_json::to_value(export_workflow(&original)).unwrap();
        let imported = import_workflow(&exported, "user-2", &ImportOptions::default()).unwrap();

        assert_eq!(imported.status, WorkflowStatus::Draft);
        assert_eq!(imported.created_by, "user-2");
        assert_eq!(imported.execution_count, 0);
        assert_ne!(imported.id, original.id);
        for node in &imported.nodes {
            assert!(original.get_node(&node.id).is_none());
        }
        for edge in &imported.edges {
            assert!(imported.get_node(&edge.source).is_some());
            assert!(imported.get_node(&edge.target).is_some());
        }
    }

    #[test]
    fn test_import_keep_ids_and_overrides() {
        let exported = serde_json::to_value(export_workflow(&sample_workflow())).unwrap();
        let options = ImportOptions::default()
            .keep_ids()
            .with_name("Copy")
            .with_description("Copied");
        let imported = import_workflow(&exported, "user-3", &options).unwrap();
        assert_eq!(imported.name, "Copy");
        assert_eq!(imported.description, "Copied");
        assert!(imported.get_node("c").is_some());
        assert_eq!(imported.edges[0].id, "e1");
    }

    #[test]
    fn test_invalid_import_reports_all_errors() {
        let exported = json!({
            "version": "1.0",
            "workflow": {
                "name": "",
                "nodes": [{"id": "a", "position": {"x": 0, "y": 0}}],
                "edges": [{"id": "e", "source": "a", "target": "zzz", "sourcePort": "output", "targetPort": "input"}]
            }
        });
        let err = import_workflow(&exported, "u", &ImportOptions::default()).unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.len() >= 3);
        assert!(errors.iter().any(|e| e.contains("zzz")));
    }

    #[test]
    fn test_unknown_exported_status_imports_as_draft() {
        let exported = json!({
            "version": "1.0",
            "workflow": {
                "name": "Published elsewhere",
                "status": "published",
                "nodes": [{"id": "t", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}}],
                "edges": []
            }
        });
        assert!(validate_export(&exported).valid);

        let imported = import_workflow(&exported, "u", &ImportOptions::default()).unwrap();
        assert_eq!(imported.status, WorkflowStatus::Draft);
    }

    #[test]
    fn test_edge_without_ports_uses_default_ports() {
        let exported = json!({
            "version": "1.0",
            "workflow": {
                "name": "Portless",
                "nodes": [
                    {"id": "t", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}},
                    {"id": "k", "type": "task", "position": {"x": 1, "y": 0}, "data": {"title": "x"}}
                ],
                "edges": [{"id": "e1", "source": "t", "target": "k"}]
            }
        });
        assert!(validate_export(&exported).valid);

        let imported = import_workflow(&exported, "u", &ImportOptions::default()).unwrap();
        assert_eq!(imported.edges[0].source_port, "output");
        assert_eq!(imported.edges[0].target_port, "input");
    }

    #[test]
    fn test_validated_import_never_fails_with_bare_parse_error() {
        let exported = json!({
            "version": 1,
            "workflow": {
                "name": "Numeric version",
                "nodes": [{"id": "t", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}}],
                "edges": []
            }
        });
        let err = import_workflow(&exported, "u", &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidExport(_)));

        let err = import_workflow(&exported, "u", &ImportOptions::default().without_validation())
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_unvalidated_import_keeps_stale_edge_ids() {
        let exported = json!({
            "version": "1.0",
            "workflow": {
                "name": "stale",
                "nodes": [{"id": "a", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}}],
                "edges": [{"id": "e", "source": "a", "target": "missing", "sourcePort": "output", "targetPort": "input"}]
            }
        });
        let imported =
            import_workflow(&exported, "u", &ImportOptions::default().without_validation())
                .unwrap();
        assert_eq!(imported.edges.len(), 1);
        assert_eq!(imported.edges[0].target, "missing");
        assert_eq!(imported.edges[0].source, imported.nodes[0].id);
    }

    #[test]
    fn test_batch_round_trip_is_independent() {
        let good = sample_workflow();
        let batch = serde_json::to_value(export_multiple(&[good.clone(), good])).unwrap();
        assert_eq!(batch["count"], 2);

        let mut broken = batch.clone();
        broken["workflows"][1]["name"] = json!("");
        let results = import_multiple(&broken, "u", &ImportOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_import_multiple_rejects_non_batch() {
        let err = import_multiple(&json!({"version": "1.0"}), "u", &ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }
}
