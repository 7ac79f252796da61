//! Webhook node - call an external HTTP endpoint.
//!
//! Leaves through `"success"` for 2xx/3xx responses and `"error"` for
//! status >= 400. Transport failures are node errors and are retried when
//! the workflow allows it.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::agent::{ERROR_PORT, SUCCESS_PORT};
use super::template::{render_string, render_value};
use super::types::{NodeContext, NodeExecutor, NodeOutput};
use super::WEBHOOK;
use crate::config::WebhookConfig;
use crate::error::{Error, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Webhook node.
pub struct WebhookNode {
    client: Client,
    default_timeout: Duration,
    allow_internal_urls: bool,
}

impl WebhookNode {
    pub fn new() -> Self {
        Self::from_config(&WebhookConfig::default())
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout defaults: {}", e);
                Client::new()
            });
        Self {
            client,
            default_timeout: Duration::from_secs(config.timeout_seconds),
            allow_internal_urls: config.allow_internal_urls,
        }
    }
}

impl Default for WebhookNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookNodeConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

fn default_method() -> String {
    "POST".to_string()
}

#[async_trait]
impl NodeExecutor for WebhookNode {
    fn node_type(&self) -> &str {
        WEBHOOK
    }

    fn description(&self) -> &str {
        "Call an HTTP endpoint; branches on success or error status"
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeOutput> {
        let config: WebhookNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid webhook config: {}", e)))?;

        let url = render_string(&config.url, &ctx.variables);
        if !self.allow_internal_urls {
            validate_url(&url)?;
        }

        let method = config.method.to_uppercase();
        debug!("Webhook {} {}", method, url);

        let mut request = match method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            "PATCH" => self.client.patch(&url),
            _ => return Err(Error::Node(format!("Unknown HTTP method: {}", config.method))),
        };

        for (key, value) in &config.headers {
            let header_value = match value {
                Value::String(s) => render_string(s, &ctx.variables),
                _ => value.to_string(),
            };
            request = request.header(key, header_value);
        }

        if let Some(body) = &config.body {
            request = request.json(&render_value(body, &ctx.variables));
        }

        let timeout = config
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        request = request.timeout(timeout);

        let start = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| {
            Error::Node(format!("Failed to read webhook response from {}: {}", url, e))
        })?;
        let body = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));

        info!(
            "Webhook {} {} -> {} ({}ms)",
            method,
            url,
            status,
            start.elapsed().as_millis()
        );

        let port = if status >= 400 { ERROR_PORT } else { SUCCESS_PORT };
        Ok(NodeOutput::on_port(
            json!({ "status": status, "body": body }),
            port,
        ))
    }
}

/// Reject non-http(s) schemes and internal hosts.
fn validate_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Node(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::Node(format!(
                "Unsupported URL scheme '{}'. Only http and https are allowed.",
                scheme
            )));
        }
    }

    let Some(host) = parsed.host_str() else {
        return Err(Error::Node(format!("URL '{}' has no host", url)));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();

    let internal_name = host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal");
    let internal_ip = host
        .parse::<IpAddr>()
        .map(|ip| is_private_or_special_ip(&ip))
        .unwrap_or(false);

    if internal_name || internal_ip {
        warn!("Blocked webhook call to internal address: {}", url);
        return Err(Error::Node(
            "Webhook calls to internal addresses are not allowed".to_string(),
        ));
    }
    Ok(())
}

fn is_private_or_special_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || ipv4.octets()[0] == 100 && (ipv4.octets()[1] & 0xc0) == 64
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6
                    .to_ipv4_mapped()
                    .map(|v4| is_private_or_special_ip(&IpAddr::V4(v4)))
                    .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_blocks_internal() {
        assert!(validate_url("http://localhost:8080/hook").is_err());
        assert!(validate_url("http://127.0.0.1/hook").is_err());
        assert!(validate_url("http://10.1.2.3/hook").is_err());
        assert!(validate_url("http://[::1]/hook").is_err());
        assert!(validate_url("http://metadata.google.internal/").is_err());
        assert!(validate_url("ftp://example.com/file").is_err());
    }

    #[test]
    fn test_validate_url_allows_public() {
        assert!(validate_url("https://hooks.example.com/notify").is_ok());
        assert!(validate_url("http://93.184.216.34/").is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_is_error() {
        let node = WebhookNode::new();
        let ctx = NodeContext::new("exec-1", "wf");
        assert!(node.execute(&json!({"method": "POST"}), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_blocked_url_fails_before_sending() {
        let node = WebhookNode::new();
        let ctx = NodeContext::new("exec-1", "wf")
            .with_variables(json!({"host": "localhost"}).as_object().unwrap().clone());

        let err = node
            .execute(&json!({"url": "http://${host}/hook"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("internal"));
    }

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_node() -> WebhookNode {
        WebhookNode::from_config(&WebhookConfig {
            timeout_seconds: 5,
            allow_internal_urls: true,
        })
    }

    #[tokio::test]
    async fn test_ok_status_leaves_through_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-task", "t-7"))
            .and(body_json(json!({"title": "Ship it"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = NodeContext::new("exec-1", "wf").with_variables(
            json!({"task": {"id": "t-7", "title": "Ship it"}})
                .as_object()
                .unwrap()
                .clone(),
        );
        let config = json!({
            "url": format!("{}/hook", server.uri()),
            "headers": {"x-task": "${task.id}"},
            "body": {"title": "${task.title}"}
        });

        let output = local_node().execute(&config, &ctx).await.unwrap();
        assert_eq!(output.port.as_deref(), Some(SUCCESS_PORT));
        assert_eq!(output.data["status"], 200);
        assert_eq!(output.data["body"]["ok"], true);
    }

    #[tokio::test]
    async fn test_error_status_leaves_through_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let ctx = NodeContext::new("exec-1", "wf");
        let config = json!({"url": format!("{}/hook", server.uri()), "method": "get"});

        let output = local_node().execute(&config, &ctx).await.unwrap();
        assert_eq!(output.port.as_deref(), Some(ERROR_PORT));
        assert_eq!(output.data["status"], 500);
        assert_eq!(output.data["body"], "boom");
    }

    async fn refused_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/hook", addr)
    }

    #[tokio::test]
    async fn test_refused_connection_is_node_error() {
        let ctx = NodeContext::new("exec-1", "wf");
        let config = json!({"url": refused_url().await});

        assert!(local_node().execute(&config, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried_by_engine() {
        use crate::engine::{ExecutionEngine, ExecutionErrorKind, LogLevel};
        use crate::nodes::NodeRegistry;
        use crate::workflow::{Workflow, WorkflowNode};
        use std::sync::Arc;

        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(local_node()));
        let engine = ExecutionEngine::new().with_registry(registry);

        let mut wf = Workflow::new("Unreachable", "user1");
        wf.add_node(WorkflowNode::new("w", WEBHOOK, json!({"url": refused_url().await})))
            .unwrap();
        wf.settings.retry_on_error = true;
        wf.settings.max_retries = 2;

        let execution = engine.execute(&wf, "user1", Map::new()).await.unwrap();

        assert_eq!(execution.error_kind(), Some(ExecutionErrorKind::NodeExecutionError));
        assert_eq!(
            execution
                .node_logs("w")
                .filter(|l| l.level == LogLevel::Error && l.message.contains("attempt"))
                .count(),
            3
        );
    }
}
