//! Per-session transcript accumulation and end-of-call flush.

use crate::helpdesk::HelpdeskClient;
use crate::summary::Summarizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use wattline_types::{SessionIdentity, TranscriptEntry, TranscriptRole};

/// Outcome of the end-of-call flush.
///
/// `success: false` with a `reason` covers both skips (`not_configured`,
/// `no_messages`) and external failures (`contact_creation_failed`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FlushResult {
    fn pushed(conversation_id: i64, message_count: usize) -> Self {
        Self {
            success: true,
            conversation_id: Some(conversation_id),
            message_count: Some(message_count),
            reason: None,
        }
    }

    fn not_pushed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            conversation_id: None,
            message_count: None,
            reason: Some(reason.into()),
        }
    }
}

/// Accumulates one session's transcript and externalizes it on close.
///
/// Single-use: one recorder per session, consumed by [`close`]. The
/// bridge's closing guard ensures `close` runs at most once.
///
/// [`close`]: TranscriptRecorder::close
pub struct TranscriptRecorder {
    identity: SessionIdentity,
    helpdesk: HelpdeskClient,
    summarizer: Summarizer,
    entries: Vec<TranscriptEntry>,
    escalation_requested: bool,
    started_at: DateTime<Utc>,
    log_path: Option<PathBuf>,
}

impl TranscriptRecorder {
    /// Creates a recorder for a session. `log_dir`, when set, enables
    /// durable per-append persistence to `<log_dir>/<session_id>_<uuid>.json`.
    pub fn new(
        identity: SessionIdentity,
        helpdesk: HelpdeskClient,
        summarizer: Summarizer,
        log_dir: Option<&Path>,
    ) -> Self {
        let log_path = log_dir.map(|dir| {
            dir.join(format!(
                "{}_{}.json",
                sanitize_for_filename(&identity.session_id),
                Uuid::new_v4()
            ))
        });

        Self {
            identity,
            helpdesk,
            summarizer,
            entries: Vec::new(),
            escalation_requested: false,
            started_at: Utc::now(),
            log_path,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn message_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Records that the conversation asked for a human handoff. Idempotent.
    pub fn mark_escalation_requested(&mut self) {
        if !self.escalation_requested {
            self.escalation_requested = true;
            tracing::info!(session_id = %self.identity.session_id, "human escalation requested");
        }
    }

    pub fn escalation_requested(&self) -> bool {
        self.escalation_requested
    }

    pub async fn append_user(&mut self, text: impl Into<String>) {
        self.append(TranscriptEntry::now(TranscriptRole::User, text)).await;
    }

    pub async fn append_assistant(&mut self, text: impl Into<String>) {
        self.append(TranscriptEntry::now(TranscriptRole::Assistant, text))
            .await;
    }

    async fn append(&mut self, entry: TranscriptEntry) {
        tracing::info!(
            session_id = %self.identity.session_id,
            role = entry.role.as_str(),
            "transcript: {}",
            entry.text
        );
        self.entries.push(entry);
        self.persist(None).await;
    }

    /// Rewrites the session log file with the current state. Persistence
    /// failures are logged and swallowed; the in-memory transcript is the
    /// source of truth for the flush.
    async fn persist(&self, conversation_id: Option<i64>) {
        let Some(path) = &self.log_path else {
            return;
        };

        let document = json!({
            "sessionId": self.identity.session_id,
            "callSid": self.identity.call_id,
            "streamSid": self.identity.stream_id,
            "caller": self.identity.caller,
            "startTime": self.started_at.to_rfc3339(),
            "lastUpdate": Utc::now().to_rfc3339(),
            "messageCount": self.entries.len(),
            "messages": self.entries,
            "conversationId": conversation_id,
            "escalationRequested": self.escalation_requested,
        });

        let rendered = match serde_json::to_vec_pretty(&document) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(session_id = %self.identity.session_id, "failed to serialize transcript log: {e}");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(path, rendered).await {
            tracing::error!(
                session_id = %self.identity.session_id,
                path = %path.display(),
                "failed to write transcript log: {e}"
            );
        }
    }

    /// Externalizes the transcript at session end.
    ///
    /// Steps, in order: contact create-or-find, conversation creation,
    /// message push (append order), urgency toggle, summary generation and
    /// attachment. An early-step failure aborts later steps with a
    /// structured reason; urgency and summary are best-effort.
    pub async fn close(self) -> FlushResult {
        let session_id = self.identity.session_id.clone();
        tracing::info!(
            session_id = %session_id,
            messages = self.entries.len(),
            "closing transcript"
        );

        if !self.helpdesk.is_configured() {
            tracing::info!(session_id = %session_id, "helpdesk not configured, skipping flush");
            return FlushResult::not_pushed("not_configured");
        }

        if self.entries.is_empty() {
            tracing::info!(session_id = %session_id, "no messages to flush");
            return FlushResult::not_pushed("no_messages");
        }

        let contact_id = match self.helpdesk.create_or_find_contact(&self.identity).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session_id = %session_id, "contact creation failed: {e}");
                return FlushResult::not_pushed("contact_creation_failed");
            }
        };

        let conversation_id = match self
            .helpdesk
            .create_conversation(contact_id, &self.identity, self.escalation_requested)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session_id = %session_id, contact_id, "conversation creation failed: {e}");
                return FlushResult::not_pushed("conversation_creation_failed");
            }
        };

        for entry in &self.entries {
            if let Err(e) = self.helpdesk.append_message(conversation_id, entry).await {
                tracing::error!(
                    session_id = %session_id,
                    conversation_id,
                    "message push failed: {e}"
                );
                return FlushResult::not_pushed("message_push_failed");
            }
        }

        // Record the conversation id in the local log now that it exists.
        self.persist(Some(conversation_id)).await;

        if self.escalation_requested {
            if let Err(e) = self.helpdesk.mark_urgent(conversation_id).await {
                tracing::warn!(session_id = %session_id, conversation_id, "urgency toggle failed: {e}");
            }
        }

        let summary = self.summarizer.generate(&self.entries).await;
        if let Err(e) = self.helpdesk.attach_summary(conversation_id, &summary).await {
            tracing::warn!(session_id = %session_id, conversation_id, "summary attachment failed: {e}");
        }

        tracing::info!(
            session_id = %session_id,
            conversation_id,
            messages = self.entries.len(),
            "transcript flushed"
        );
        FlushResult::pushed(conversation_id, self.entries.len())
    }
}

/// Keeps session ids filesystem-safe ("+33..." callers contain `+`).
fn sanitize_for_filename(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::HelpdeskConfig;
    use crate::summary::SummaryConfig;

    fn recorder(log_dir: Option<&Path>) -> TranscriptRecorder {
        TranscriptRecorder::new(
            SessionIdentity::phone("+33600000000"),
            HelpdeskClient::new(HelpdeskConfig::default()),
            Summarizer::new(SummaryConfig::default()),
            log_dir,
        )
    }

    #[tokio::test]
    async fn appends_preserve_arrival_order() {
        let mut rec = recorder(None);
        rec.append_user("Bonjour").await;
        rec.append_assistant("Bonjour, comment puis-je vous aider?").await;
        rec.append_user("Ma borne ne marche pas").await;

        let roles: Vec<TranscriptRole> = rec.entries().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![
                TranscriptRole::User,
                TranscriptRole::Assistant,
                TranscriptRole::User
            ]
        );
        assert_eq!(rec.message_count(), 3);
    }

    #[tokio::test]
    async fn each_append_rewrites_the_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut rec = recorder(Some(dir.path()));

        rec.append_user("Bonjour").await;
        let first = read_log(dir.path()).await;
        assert_eq!(first["messageCount"], 1);

        rec.append_assistant("Bonjour!").await;
        let second = read_log(dir.path()).await;
        assert_eq!(second["messageCount"], 2);
        assert_eq!(second["messages"][0]["role"], "user");
        assert_eq!(second["messages"][1]["role"], "assistant");
        assert_eq!(second["sessionId"], "tel-+33600000000");
    }

    #[tokio::test]
    async fn escalation_flag_is_idempotent() {
        let mut rec = recorder(None);
        assert!(!rec.escalation_requested());
        rec.mark_escalation_requested();
        rec.mark_escalation_requested();
        assert!(rec.escalation_requested());
    }

    #[tokio::test]
    async fn close_without_helpdesk_reports_not_configured() {
        let mut rec = recorder(None);
        rec.append_user("Bonjour").await;

        let result = rec.close().await;
        assert!(!result.success);
        assert_eq!(result.reason.as_deref(), Some("not_configured"));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_for_filename("tel-+33600000000"), "tel-_33600000000");
        assert_eq!(sanitize_for_filename("web-abc-123"), "web-abc-123");
    }

    async fn read_log(dir: &Path) -> serde_json::Value {
        let mut entries = tokio::fs::read_dir(dir).await.expect("read_dir");
        let entry = entries
            .next_entry()
            .await
            .expect("next_entry")
            .expect("log file present");
        let bytes = tokio::fs::read(entry.path()).await.expect("read log");
        serde_json::from_slice(&bytes).expect("valid json log")
    }
}
