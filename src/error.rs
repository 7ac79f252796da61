//! Error types for nodeflow.
//!
//! Errors carry a stable code so callers (CLI, host applications, agents)
//! can branch on them without parsing messages.

use thiserror::Error;

/// Result type alias for nodeflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// nodeflow error types.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow '{0}' has no nodes")]
    EmptyWorkflow(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Import-blocking structural problems, all of them at once.
    #[error("Invalid workflow export: {}", .0.join("; "))]
    InvalidExport(Vec<String>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Workflow(_) => "WORKFLOW_ERROR",
            Error::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Error::EmptyWorkflow(_) => "EMPTY_WORKFLOW",
            Error::Node(_) => "NODE_ERROR",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::InvalidExport(_) => "VALIDATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Validation messages carried by this error, if it is an export validation failure.
    pub fn validation_errors(&self) -> Option<&[String]> {
        match self {
            Error::InvalidExport(errors) => Some(errors),
            _ => None,
        }
    }

    /// Convert to a JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(errors) = self.validation_errors() {
            error["errors"] = serde_json::json!(errors);
        }
        serde_json::json!({
            "success": false,
            "error": error,
        })
    }
}
