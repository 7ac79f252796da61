//! nodeflow - node-graph workflow automation engine
//!
//! Workflows are directed graphs of typed nodes connected by port-to-port
//! edges. The engine walks the graph from its trigger nodes, resolving each
//! node type through a registry, and records every step in an execution log.
//!
//! ## Key Features
//!
//! - **Portable**: Export/import documents with structural validation
//! - **Event and Schedule Triggers**: Task/project events with filters, `5m`/`2h`/`1d` intervals
//! - **Pluggable**: Custom node types and agent tools register through plugins
//! - **Structured Results**: Typed execution errors with stable kinds
//!
//! ## Example
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "workflow": {
//!     "name": "escalate-urgent",
//!     "nodes": [
//!       { "id": "t", "type": "trigger", "outputs": [{ "id": "output" }] },
//!       { "id": "c", "type": "condition", "outputs": [{ "id": "true" }, { "id": "false" }],
//!         "data": { "field": "${entity.priority}", "operator": "equals", "value": "urgent" } },
//!       { "id": "a", "type": "task", "data": { "title": "Escalate ${entity.title}" } }
//!     ],
//!     "edges": [
//!       { "id": "e1", "source": "t", "sourcePort": "output", "target": "c", "targetPort": "input" },
//!       { "id": "e2", "source": "c", "sourcePort": "true", "target": "a", "targetPort": "input" }
//!     ]
//!   }
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod plugins;
pub mod storage;
pub mod telemetry;
pub mod triggers;
pub mod workflow;

pub use config::Config;
pub use engine::{ExecutionEngine, WorkflowExecution, WorkflowRunner};
pub use error::{Error, Result};
pub use nodes::NodeRegistry;
pub use workflow::Workflow;
