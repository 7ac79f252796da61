//! Structural validation of workflow export documents.
//!
//! Validation works on raw JSON so malformed documents produce a readable
//! list of problems instead of a single deserialization failure. Every
//! problem is collected; nothing stops at the first error.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::nodes::TRIGGER;

/// Outcome of validating an export document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Import-blocking problems
    pub errors: Vec<String>,
    /// Non-blocking observations
    pub warnings: Vec<String>,
}

/// Validate a single-workflow export document.
///
/// Checks for:
/// - `version` and `workflow` presence
/// - a non-empty workflow name
/// - `nodes` / `edges` being arrays
/// - unique node and edge IDs
/// - node `type` and well-formed `{x, y}` position
/// - edge endpoints referencing declared nodes
///
/// Warns about nodes without `data`, non-trigger nodes no edge points at,
/// and graphs without a trigger node.
pub fn validate_export(exported: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if exported.get("version").map_or(true, Value::is_null) {
        errors.push("Missing export version".to_string());
    }

    let Some(workflow) = exported.get("workflow").filter(|w| w.is_object()) else {
        errors.push("Missing workflow definition".to_string());
        return ValidationReport {
            valid: false,
            errors,
            warnings,
        };
    };

    let name = workflow.get("name").and_then(Value::as_str).unwrap_or("");
    if name.trim().is_empty() {
        errors.push("Workflow name is required".to_string());
    }

    let nodes = workflow.get("nodes").and_then(Value::as_array);
    if nodes.is_none() {
        errors.push("Workflow nodes must be an array".to_string());
    }
    let edges = workflow.get("edges").and_then(Value::as_array);
    if edges.is_none() {
        errors.push("Workflow edges must be an array".to_string());
    }

    let nodes: &[Value] = nodes.map(Vec::as_slice).unwrap_or_default();
    let edges: &[Value] = edges.map(Vec::as_slice).unwrap_or_default();

    let mut node_ids: HashSet<&str> = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let id = node.get("id").and_then(Value::as_str).unwrap_or("");
        let label = if id.is_empty() {
            errors.push(format!("Node at index {} is missing an ID", index));
            format!("#{}", index)
        } else {
            if !node_ids.insert(id) {
                errors.push(format!("Duplicate node ID: {}", id));
            }
            id.to_string()
        };

        let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
        if node_type.is_empty() {
            errors.push(format!("Node '{}' is missing a type", label));
        }

        if !has_valid_position(node) {
            errors.push(format!(
                "Node '{}' is missing a valid position {{x, y}}",
                label
            ));
        }

        if node.get("data").map_or(true, Value::is_null) {
            warnings.push(format!("Node '{}' has no data", label));
        }
    }

    let mut edge_ids: HashSet<&str> = HashSet::new();
    let mut targeted: HashSet<&str> = HashSet::new();
    for (index, edge) in edges.iter().enumerate() {
        let id = edge.get("id").and_then(Value::as_str).unwrap_or("");
        let label = if id.is_empty() {
            errors.push(format!("Edge at index {} is missing an ID", index));
            format!("#{}", index)
        } else {
            if !edge_ids.insert(id) {
                errors.push(format!("Duplicate edge ID: {}", id));
            }
            id.to_string()
        };

        for endpoint in ["source", "target"] {
            match edge.get(endpoint).and_then(Value::as_str) {
                Some(node_id) if node_ids.contains(node_id) => {
                    if endpoint == "target" {
                        targeted.insert(node_id);
                    }
                }
                Some(node_id) => errors.push(format!(
                    "Edge '{}' references non-existent {} node '{}'",
                    label, endpoint, node_id
                )),
                None => errors.push(format!("Edge '{}' is missing its {}", label, endpoint)),
            }
        }
    }

    let mut has_trigger = false;
    for node in nodes {
        let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
        if node_type == TRIGGER {
            has_trigger = true;
            continue;
        }
        if let Some(id) = node.get("id").and_then(Value::as_str) {
            if !id.is_empty() && !targeted.contains(id) {
                warnings.push(format!("Node '{}' is not reachable from any edge", id));
            }
        }
    }
    if !has_trigger {
        warnings.push("Workflow has no trigger node".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn has_valid_position(node: &Value) -> bool {
    node.get("position")
        .filter(|p| p.is_object())
        .map(|p| {
            p.get("x").map_or(false, Value::is_number) && p.get("y").map_or(false, Value::is_number)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_export() -> Value {
        json!({
            "version": "1.0",
            "exportedAt": "2026-01-01T00:00:00Z",
            "workflow": {
                "name": "Notify on done",
                "description": "",
                "status": "active",
                "nodes": [
                    {"id": "t", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}, "inputs": [], "outputs": [{"id": "output", "name": "output", "type": "flow"}]},
                    {"id": "k", "type": "task", "position": {"x": 200, "y": 0}, "data": {"title": "Follow up"}, "inputs": [], "outputs": []}
                ],
                "edges": [
                    {"id": "e1", "source": "t", "target": "k", "sourcePort": "output", "targetPort": "input"}
                ]
            }
        })
    }

    #[test]
    fn test_valid_export_passes() {
        let report = validate_export(&valid_export());
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_edge_to_missing_node_names_the_id() {
        let mut export = valid_export();
        export["workflow"]["edges"][0]["target"] = json!("ghost-node");
        let report = validate_export(&export);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("ghost-node")));
    }

    #[test]
    fn test_missing_version_and_workflow() {
        let report = validate_export(&json!({}));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_collects_all_errors() {
        let export = json!({
            "version": "1.0",
            "workflow": {
                "name": "",
                "nodes": [
                    {"id": "a", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {}},
                    {"id": "a", "position": {"x": 1}, "data": {}}
                ],
                "edges": "nope"
            }
        });
        let report = validate_export(&export);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("name is required")));
        assert!(report.errors.iter().any(|e| e.contains("edges must be an array")));
        assert!(report.errors.iter().any(|e| e.contains("Duplicate node ID: a")));
        assert!(report.errors.iter().any(|e| e.contains("missing a type")));
        assert!(report.errors.iter().any(|e| e.contains("valid position")));
    }

    #[test]
    fn test_duplicate_edge_ids() {
        let mut export = valid_export();
        let edge = export["workflow"]["edges"][0].clone();
        export["workflow"]["edges"]
            .as_array_mut()
            .unwrap()
            .push(edge);
        let report = validate_export(&export);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate edge ID: e1")));
    }

    #[test]
    fn test_warnings_do_not_block() {
        let export = json!({
            "version": "1.0",
            "workflow": {
                "name": "loose",
                "nodes": [
                    {"id": "a", "type": "action", "position": {"x": 0, "y": 0}}
                ],
                "edges": []
            }
        });
        let report = validate_export(&export);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("has no data")));
        assert!(report.warnings.iter().any(|w| w.contains("not reachable")));
        assert!(report.warnings.iter().any(|w| w.contains("no trigger node")));
    }
}
