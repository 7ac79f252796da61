//! Delay node - pause the current branch for a duration.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::DELAY;
use crate::error::{Error, Result};

const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// Delay node that pauses execution.
pub struct DelayNode;

impl DelayNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DelayNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Deserialize)]
struct DelayConfig {
    /// Fractional seconds allowed (0.5 = 500ms)
    #[serde(default)]
    seconds: Option<f64>,

    #[serde(default)]
    milliseconds: Option<u64>,

    #[serde(default)]
    minutes: Option<f64>,

    /// RFC 3339 timestamp to wait for
    #[serde(default)]
    until: Option<String>,
}

#[async_trait]
impl NodeExecutor for DelayNode {
    fn node_type(&self) -> &str {
        DELAY
    }

    fn description(&self) -> &str {
        "Pause the branch for a duration or until a timestamp (max 1 hour)"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: DelayConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid delay config: {}", e)))?;

        let delay_ms = delay_duration_ms(&config)?;
        if delay_ms > 0 {
            info!(
                execution_id = %ctx.execution_id,
                node_id = %ctx.node_id,
                "Delaying for {}ms", delay_ms
            );
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }

        Ok(NodeOutput::new(json!({ "delayedMs": delay_ms })))
    }
}

fn delay_duration_ms(config: &DelayConfig) -> Result<u64> {
    if let Some(until) = &config.until {
        let target = chrono::DateTime::parse_from_rfc3339(until)
            .map_err(|e| Error::Node(format!("Invalid 'until' timestamp '{}': {}", until, e)))?
            .with_timezone(&chrono::Utc);
        let remaining = (target - chrono::Utc::now()).num_milliseconds();
        return capped(remaining.max(0) as u64);
    }

    let mut total_ms: u64 = 0;
    for (amount, unit_ms) in [(config.minutes, 60_000.0), (config.seconds, 1_000.0)] {
        if let Some(amount) = amount {
            if amount < 0.0 {
                return Err(Error::Node("Delay duration cannot be negative".to_string()));
            }
            total_ms = total_ms.saturating_add((amount * unit_ms) as u64);
        }
    }
    if let Some(ms) = config.milliseconds {
        total_ms = total_ms.saturating_add(ms);
    }

    capped(total_ms)
}

fn capped(ms: u64) -> Result<u64> {
    if ms > MAX_DELAY_MS {
        return Err(Error::Node(format!(
            "Delay of {}ms exceeds maximum of {}ms (1 hour)",
            ms, MAX_DELAY_MS
        )));
    }
    Ok(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_units() {
        let config = DelayConfig {
            seconds: Some(30.0),
            milliseconds: Some(500),
            minutes: Some(1.0),
            until: None,
        };
        assert_eq!(delay_duration_ms(&config).unwrap(), 90_500);
    }

    #[test]
    fn test_fractional_seconds() {
        let config = DelayConfig {
            seconds: Some(2.5),
            ..Default::default()
        };
        assert_eq!(delay_duration_ms(&config).unwrap(), 2_500);
    }

    #[test]
    fn test_negative_and_oversized_fail() {
        let negative = DelayConfig {
            seconds: Some(-5.0),
            ..Default::default()
        };
        assert!(delay_duration_ms(&negative).is_err());

        let too_long = DelayConfig {
            minutes: Some(120.0),
            ..Default::default()
        };
        assert!(delay_duration_ms(&too_long).is_err());
    }

    #[test]
    fn test_until_in_past_is_zero() {
        let config = DelayConfig {
            until: Some("2020-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert_eq!(delay_duration_ms(&config).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delay_node_reports_duration() {
        let node = DelayNode::new();
        let ctx = NodeContext::new("exec-1", "wf");

        let output = node.execute(&json!({"milliseconds": 5}), &ctx).await.unwrap();
        assert_eq!(output.data["delayedMs"], 5);
        assert!(output.port.is_none());
    }
}
