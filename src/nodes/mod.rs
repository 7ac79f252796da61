//! Node implementations.
//!
//! Nodes are the building blocks of workflows. Each node type performs a
//! specific step (branching, creating a task, asking an agent, etc.).

mod action;
pub mod agent;
pub mod condition;
mod delay;
mod registry;
mod task;
pub mod template;
mod trigger;
mod types;
mod webhook;

pub use action::ActionNode;
pub use agent::AgentNode;
pub use condition::ConditionNode;
pub use delay::DelayNode;
pub use registry::NodeRegistry;
pub use task::TaskNode;
pub use trigger::TriggerNode;
pub use types::{NodeContext, NodeExecutor, NodeOutput};
pub use webhook::WebhookNode;

pub const TRIGGER: &str = "trigger";
pub const CONDITION: &str = "condition";
pub const ACTION: &str = "action";
pub const AI_AGENT: &str = "ai-agent";
pub const TASK: &str = "task";
pub const DELAY: &str = "delay";
pub const WEBHOOK: &str = "webhook";
