//! AI agent node - hands an instruction to an agent.
//!
//! Leaves through `"success"` when the agent reports success and `"error"`
//! otherwise. With `allowTools`, the agent's output must follow the
//! [`AgentReply`] contract; malformed replies are re-asked a bounded number
//! of times.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::template::render_string;
use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::AI_AGENT;
use crate::error::{Error, Result};
use crate::plugins::AgentReply;

pub const SUCCESS_PORT: &str = "success";
pub const ERROR_PORT: &str = "error";

const MAX_REPLY_ATTEMPTS: u32 = 3;

/// AI agent node.
pub struct AgentNode;

impl AgentNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AgentNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentNodeConfig {
    agent_id: String,
    instruction: String,
    #[serde(default)]
    allow_tools: bool,
}

#[async_trait]
impl NodeExecutor for AgentNode {
    fn node_type(&self) -> &str {
        AI_AGENT
    }

    fn description(&self) -> &str {
        "Run an AI agent with an instruction; branches on success or error"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: AgentNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid ai-agent config: {}", e)))?;
        let agent = ctx.services.agent()?;

        let instruction = render_string(&config.instruction, &ctx.variables);
        info!(
            execution_id = %ctx.execution_id,
            agent_id = %config.agent_id,
            "Agent instruction: {}...",
            instruction.chars().take(100).collect::<String>()
        );

        let mut prompt = instruction.clone();
        for attempt in 1..=MAX_REPLY_ATTEMPTS {
            let response = agent.execute_agent(&config.agent_id, &prompt).await?;
            if !response.success {
                return Ok(NodeOutput::on_port(
                    json!({ "success": false, "output": response.output }),
                    ERROR_PORT,
                ));
            }
            if !config.allow_tools {
                return Ok(NodeOutput::on_port(
                    json!({ "success": true, "output": response.output }),
                    SUCCESS_PORT,
                ));
            }

            match AgentReply::parse(&response.output) {
                Ok(AgentReply::Final { output }) => {
                    return Ok(NodeOutput::on_port(
                        json!({ "success": true, "output": output }),
                        SUCCESS_PORT,
                    ));
                }
                Ok(AgentReply::ToolCall { tool, arguments }) => {
                    let handler = ctx
                        .services
                        .tools
                        .get(&tool)
                        .ok_or_else(|| Error::Node(format!("Agent requested unknown tool '{}'", tool)))?;
                    let result = handler.call(&arguments).await?;
                    return Ok(NodeOutput::on_port(
                        json!({ "success": true, "tool": tool, "output": result }),
                        SUCCESS_PORT,
                    ));
                }
                Err(e) => {
                    warn!(
                        agent_id = %config.agent_id,
                        attempt,
                        "Rejected agent reply: {}", e
                    );
                    prompt = format!(
                        "{}\n\nYour previous reply was rejected ({}). Reply with exactly one JSON object: \
                         {{\"type\": \"final\", \"output\": ...}} or \
                         {{\"type\": \"tool_call\", \"tool\": \"<name>\", \"arguments\": {{...}}}}.",
                        instruction, e
                    );
                }
            }
        }

        Err(Error::Node(format!(
            "Agent '{}' did not produce a valid reply after {} attempts",
            config.agent_id, MAX_REPLY_ATTEMPTS
        )))
    }
}
