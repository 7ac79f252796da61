//! Workflow graph definitions, export/import and structural validation.
//!
//! Workflows are directed graphs of typed nodes:
//! - Nodes: the units of work (trigger, condition, task, ...)
//! - Edges: connections from an output port to an input port
//! - Settings: timeout, retry and notification behaviour

mod codec;
mod parser;
mod types;
mod validator;

pub use codec::{
    export_multiple, export_workflow, import_multiple, import_workflow, BatchExport,
    ExportedWorkflow, ImportOptions, WorkflowExport, EXPORT_VERSION,
};
pub use parser::{parse_export, parse_export_file, parse_workflow};
pub use types::*;
pub use validator::{validate_export, ValidationReport};
