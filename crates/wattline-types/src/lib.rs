//! Shared types for the wattline voice relay.
//!
//! This crate provides the cross-cutting definitions used by every other
//! wattline crate: session identity, transcript entries, and the tool
//! result envelope exchanged with action endpoints.
//!
//! No crate in the workspace depends on anything *except* `wattline-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of caller-side transport a session runs over.
///
/// The audio codec negotiated with the speech backend differs per
/// transport: telephony media streams carry G.711 μ-law, browser clients
/// capture PCM16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// A telephony provider media stream (phone call).
    Phone,
    /// A browser WebSocket client.
    Browser,
}

impl TransportKind {
    /// Returns the backend audio format identifier for this transport.
    pub fn audio_format(self) -> &'static str {
        match self {
            Self::Phone => "g711_ulaw",
            Self::Browser => "pcm16",
        }
    }
}

/// Correlation identifiers for one call session.
///
/// `session_id` is wattline's own opaque key, used in logs and as the
/// contact identifier in the helpdesk system. The provider-level
/// `call_id` and `stream_id` arrive with the stream-start event and stay
/// `None` until then.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: String,
    pub call_id: Option<String>,
    pub stream_id: Option<String>,
    pub caller: Option<String>,
}

impl SessionIdentity {
    /// Identity for a phone session, keyed by the caller number.
    pub fn phone(caller: &str) -> Self {
        Self {
            session_id: format!("tel-{caller}"),
            call_id: None,
            stream_id: None,
            caller: Some(caller.to_string()),
        }
    }

    /// Identity for a browser session, keyed by a fresh UUID.
    pub fn web() -> Self {
        Self {
            session_id: format!("web-{}", Uuid::new_v4()),
            call_id: None,
            stream_id: None,
            caller: None,
        }
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One finalized conversational turn.
///
/// Entries hold final recognized/spoken text only, never streaming
/// fragments. They are appended in event-arrival order, which may
/// interleave user and assistant turns non-monotonically (recognition
/// completion can lag synthesis completion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Creates an entry stamped with the current time.
    pub fn now(role: TranscriptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A tool invocation requested by the speech backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Which action to run.
    pub name: String,
    /// Correlation token tying this request to its result message.
    /// Unique within a session; duplicates must not re-execute.
    pub invocation_id: String,
    /// Parsed named arguments.
    pub arguments: serde_json::Value,
}

/// Uniform result envelope for tool invocations.
///
/// Every tool execution path — local lookup, remote webhook, unknown
/// name, transport failure — resolves to this envelope. Failures are
/// data, not errors: the speech backend decides the spoken recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Success envelope wrapping opaque result data.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failure envelope with a descriptive message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phone_identity_uses_caller_number() {
        let id = SessionIdentity::phone("+33600000000");
        assert_eq!(id.session_id, "tel-+33600000000");
        assert_eq!(id.caller.as_deref(), Some("+33600000000"));
        assert!(id.call_id.is_none());
    }

    #[test]
    fn web_identities_are_unique() {
        let a = SessionIdentity::web();
        let b = SessionIdentity::web();
        assert!(a.session_id.starts_with("web-"));
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn success_envelope_omits_error_field() {
        let outcome = ToolOutcome::ok(json!({"status": "operative"}));
        let value = serde_json::to_value(&outcome).expect("serialization should not fail");
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["status"], json!("operative"));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_envelope_omits_data_field() {
        let outcome = ToolOutcome::err("Unknown tool: foo_bar");
        let value = serde_json::to_value(&outcome).expect("serialization should not fail");
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("Unknown tool: foo_bar"));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn transcript_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TranscriptRole::User).unwrap(),
            json!("user")
        );
        assert_eq!(TranscriptRole::Assistant.as_str(), "assistant");
    }
}
