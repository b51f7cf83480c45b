//! Webhook-backed tool invocation.

use crate::guide::{self, APP_GUIDE_TOOL};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use wattline_types::{SessionIdentity, ToolCall, ToolOutcome};

/// Maps a tool name to its workflow endpoint path.
///
/// Returns `None` for unknown names and for locally resolved tools.
fn endpoint_for(name: &str) -> Option<&'static str> {
    match name {
        "station_verification" => Some("/station-verification"),
        "user_management" => Some("/user-management"),
        "verify_rfid" => Some("/verify-rfid"),
        "get_rfid" => Some("/get-rfid"),
        "remote_control" => Some("/remote-control"),
        "check_cdrs" => Some("/check-cdrs"),
        "check_invoice" => Some("/check-invoice"),
        "invoice_sending_agent" => Some("/invoice-sending"),
        "charge_station_tariff" => Some("/station-tariff"),
        "priority" => Some("/priority-escalation"),
        _ => None,
    }
}

/// Configuration for the action-endpoint base address.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ActionConfig {
    /// Base URL of the workflow host; endpoint paths are appended to it.
    pub base_url: String,
    /// Optional bearer token sent with every remote invocation.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub api_token: Option<String>,
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ActionConfig {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token,
        }
    }
}

/// Executes tools on behalf of a session.
///
/// Cheap to clone; the underlying HTTP client pools connections.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    http: reqwest::Client,
    config: ActionConfig,
}

impl ToolInvoker {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Invokes a single tool and normalizes the result.
    ///
    /// Unknown names and local tools never touch the network. All failure
    /// paths — unknown name, transport error, non-success status,
    /// unparseable body — resolve to a failure envelope.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
        identity: &SessionIdentity,
    ) -> ToolOutcome {
        if name == APP_GUIDE_TOOL {
            return invoke_guide(arguments);
        }

        let Some(endpoint) = endpoint_for(name) else {
            return ToolOutcome::err(format!("Unknown tool: {name}"));
        };

        let url = format!("{}{}", self.config.base_url, endpoint);
        let body = context_body(arguments, identity);

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(tool = name, session_id = %identity.session_id, "tool call failed: {e}");
                return ToolOutcome::err(format!("Failed to execute tool: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(
                tool = name,
                session_id = %identity.session_id,
                status = %status,
                "tool endpoint returned error: {detail}"
            );
            return ToolOutcome::err(format!("Tool execution failed: {status}"));
        }

        match response.json::<Value>().await {
            Ok(value) => ToolOutcome::ok(unwrap_singleton(value)),
            Err(e) => {
                tracing::error!(tool = name, session_id = %identity.session_id, "invalid tool response body: {e}");
                ToolOutcome::err(format!("Failed to execute tool: {e}"))
            }
        }
    }

    /// Invokes a batch of tools concurrently.
    ///
    /// Each call is independent; results are keyed by invocation id.
    pub async fn invoke_batch(
        &self,
        calls: &[ToolCall],
        identity: &SessionIdentity,
    ) -> HashMap<String, ToolOutcome> {
        let futures = calls.iter().map(|call| async {
            let outcome = self.invoke(&call.name, &call.arguments, identity).await;
            (call.invocation_id.clone(), outcome)
        });

        join_all(futures).await.into_iter().collect()
    }
}

/// Resolves the local app-guide tool synchronously.
fn invoke_guide(arguments: &Value) -> ToolOutcome {
    let request = arguments
        .get("topic")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let topic = guide::resolve_topic(request);
    ToolOutcome::ok(json!({
        "topic": topic,
        "info": guide::topic_info(topic),
    }))
}

/// Builds the request body: the tool arguments plus a `_context`
/// envelope identifying the call.
fn context_body(arguments: &Value, identity: &SessionIdentity) -> Value {
    let mut body = match arguments {
        Value::Object(map) => Value::Object(map.clone()),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };

    body["_context"] = json!({
        "callSid": identity.call_id,
        "streamSid": identity.stream_id,
        "caller": identity.caller,
        "timestamp": Utc::now().to_rfc3339(),
    });
    body
}

/// Single-element sequences unwrap to their sole element; some workflow
/// hosts wrap every response in a one-item array.
fn unwrap_singleton(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}
