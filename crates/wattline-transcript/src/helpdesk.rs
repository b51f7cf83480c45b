//! Client for the conversation-tracking (helpdesk) system.
//!
//! The helpdesk holds one contact per caller identity and one
//! conversation per session. wattline only creates records and appends
//! to them; agents work the conversation from the helpdesk UI.

use crate::error::HelpdeskError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use wattline_types::{SessionIdentity, TranscriptEntry, TranscriptRole};

/// Connection settings for the helpdesk API.
#[derive(Clone, Default, Deserialize)]
pub struct HelpdeskConfig {
    /// Base URL, e.g. `https://desk.example.com`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub inbox_id: String,
    #[serde(default)]
    pub api_token: String,
}

impl HelpdeskConfig {
    /// Whether enough settings are present to talk to the helpdesk.
    /// An unconfigured helpdesk disables externalization entirely.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.account_id.is_empty() && !self.api_token.is_empty()
    }
}

impl fmt::Debug for HelpdeskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelpdeskConfig")
            .field("url", &self.url)
            .field("account_id", &self.account_id)
            .field("inbox_id", &self.inbox_id)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HelpdeskClient {
    http: reqwest::Client,
    config: HelpdeskConfig,
}

impl HelpdeskClient {
    pub fn new(config: HelpdeskConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{}",
            self.config.url, self.config.account_id, suffix
        )
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, HelpdeskError> {
        let response = self
            .http
            .post(url)
            .header("api_access_token", &self.config.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(HelpdeskError::Status { status, detail });
        }
        Ok(response.json().await?)
    }

    /// Creates a contact for the session's caller, or finds the existing
    /// one when the identifier is already taken.
    pub async fn create_or_find_contact(
        &self,
        identity: &SessionIdentity,
    ) -> Result<i64, HelpdeskError> {
        let display_name = identity
            .caller
            .clone()
            .unwrap_or_else(|| identity.session_id.clone());

        let payload = json!({
            "inbox_id": self.config.inbox_id,
            "name": display_name,
            "identifier": identity.session_id,
            "phone_number": identity.caller,
        });

        match self.post(&self.account_url("/contacts"), payload).await {
            Ok(body) => body["payload"]["contact"]["id"]
                .as_i64()
                .ok_or(HelpdeskError::MissingField("payload.contact.id")),
            // 422 means the identifier already exists; fall back to search.
            Err(HelpdeskError::Status { status, .. })
                if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY =>
            {
                self.search_contact(identity).await
            }
            Err(e) => Err(e),
        }
    }

    async fn search_contact(&self, identity: &SessionIdentity) -> Result<i64, HelpdeskError> {
        let url = self.account_url("/contacts/search");
        let response = self
            .http
            .get(&url)
            .query(&[("q", identity.session_id.as_str())])
            .header("api_access_token", &self.config.api_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(HelpdeskError::Status { status, detail });
        }

        let body: Value = response.json().await?;
        let contact_id = body["payload"][0]["id"]
            .as_i64()
            .ok_or(HelpdeskError::MissingField("payload[0].id"))?;

        // Refresh the stored phone number; the contact may predate caller-id
        // capture. Failure here is not worth aborting the flush over.
        if let Some(caller) = &identity.caller {
            let update = self
                .http
                .put(self.account_url(&format!("/contacts/{contact_id}")))
                .header("api_access_token", &self.config.api_token)
                .json(&json!({ "phone_number": caller }))
                .send()
                .await;
            if let Err(e) = update {
                tracing::warn!(contact_id, "failed to update contact phone number: {e}");
            }
        }

        Ok(contact_id)
    }

    /// Creates a conversation linked to the contact. `urgent` sets the
    /// priority at creation time for escalated calls.
    pub async fn create_conversation(
        &self,
        contact_id: i64,
        identity: &SessionIdentity,
        urgent: bool,
    ) -> Result<i64, HelpdeskError> {
        let payload = json!({
            "source_id": identity.session_id,
            "inbox_id": self.config.inbox_id,
            "contact_id": contact_id.to_string(),
            "status": "open",
            "priority": if urgent { Value::from("urgent") } else { Value::Null },
            "additional_attributes": {},
        });

        let body = self.post(&self.account_url("/conversations"), payload).await?;
        body["id"].as_i64().ok_or(HelpdeskError::MissingField("id"))
    }

    /// Appends one transcript entry as a conversation message.
    pub async fn append_message(
        &self,
        conversation_id: i64,
        entry: &TranscriptEntry,
    ) -> Result<(), HelpdeskError> {
        let message_type = match entry.role {
            TranscriptRole::User => "incoming",
            TranscriptRole::Assistant => "outgoing",
        };
        let payload = json!({
            "content": format!("[{}]: {}", entry.role.as_str().to_uppercase(), entry.text),
            "message_type": message_type,
            "private": false,
        });

        self.post(
            &self.account_url(&format!("/conversations/{conversation_id}/messages")),
            payload,
        )
        .await?;
        Ok(())
    }

    /// Flags the conversation urgent after a human-handoff request.
    pub async fn mark_urgent(&self, conversation_id: i64) -> Result<(), HelpdeskError> {
        self.post(
            &self.account_url(&format!("/conversations/{conversation_id}/toggle_priority")),
            json!({ "priority": "urgent" }),
        )
        .await?;
        Ok(())
    }

    /// Attaches the generated summary as a custom attribute.
    pub async fn attach_summary(
        &self,
        conversation_id: i64,
        summary: &str,
    ) -> Result<(), HelpdeskError> {
        self.post(
            &self.account_url(&format!("/conversations/{conversation_id}/custom_attributes")),
            json!({ "custom_attributes": { "summary": summary } }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_when_url_missing() {
        let config = HelpdeskConfig {
            account_id: "1".into(),
            api_token: "t".into(),
            ..Default::default()
        };
        assert!(!config.is_configured());
    }

    #[test]
    fn configured_with_url_account_and_token() {
        let config = HelpdeskConfig {
            url: "https://desk.example.com".into(),
            account_id: "1".into(),
            inbox_id: "2".into(),
            api_token: "t".into(),
        };
        assert!(config.is_configured());
    }

    #[test]
    fn debug_redacts_api_token() {
        let config = HelpdeskConfig {
            url: "https://desk.example.com".into(),
            account_id: "1".into(),
            inbox_id: "2".into(),
            api_token: "super-secret".into(),
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("super-secret"));
    }
}
