//! Conversation summaries for the helpdesk record.
//!
//! Summaries are generated by a chat-completions call against the
//! configured deployment. When the call is unavailable or fails, a
//! deterministic keyword-based French summary is substituted so the
//! helpdesk record never ends up without one.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use wattline_types::{TranscriptEntry, TranscriptRole};

const SUMMARY_SYSTEM_PROMPT: &str = "Tu es un assistant qui crée des résumés concis de \
conversations téléphoniques pour une équipe de support client d'un réseau de bornes de \
recharge électrique.\n\nGénère un résumé bref et actionnable en français avec:\n\
- Motif de l'appel (1 ligne)\n- Problème/Demande du client (1-2 lignes)\n\
- Ce qui a été fait par l'assistant (1-2 lignes)\n\
- Action requise (si le client a demandé un rappel humain ou si un problème reste non résolu)\n\n\
Sois concis - maximum 5-6 lignes au total.";

/// Settings for the remote summarization call.
#[derive(Clone, Default, Deserialize)]
pub struct SummaryConfig {
    /// Chat-completions endpoint base, e.g. `https://res.openai.azure.com`.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub deployment: String,
    #[serde(default)]
    pub api_version: String,
}

impl SummaryConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty() && !self.deployment.is_empty()
    }
}

impl fmt::Debug for SummaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Summarizer {
    http: reqwest::Client,
    config: SummaryConfig,
}

impl Summarizer {
    pub fn new(config: SummaryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Produces a summary for the transcript. Infallible: remote errors
    /// fall back to the deterministic local summary.
    pub async fn generate(&self, entries: &[TranscriptEntry]) -> String {
        if entries.is_empty() {
            return "Aucun message dans la conversation.".to_string();
        }

        if !self.config.is_configured() {
            tracing::debug!("summarizer not configured, using local summary");
            return fallback_summary(entries);
        }

        match self.generate_remote(entries).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("remote summarization failed, using local summary: {e}");
                fallback_summary(entries)
            }
        }
    }

    async fn generate_remote(&self, entries: &[TranscriptEntry]) -> Result<String, reqwest::Error> {
        let conversation_text: String = entries
            .iter()
            .map(|entry| {
                let speaker = match entry.role {
                    TranscriptRole::User => "Client",
                    TranscriptRole::Assistant => "Assistant",
                };
                format!("{speaker}: {}\n", entry.text)
            })
            .collect();

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, self.config.deployment, self.config.api_version
        );

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&json!({
                "messages": [
                    { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
                    { "role": "user", "content": conversation_text },
                ],
                "max_tokens": 250,
                "temperature": 0.3,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let summary = body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .filter(|s| !s.is_empty());

        Ok(summary.unwrap_or_else(|| fallback_summary(entries)))
    }
}

/// Deterministic keyword-based summary. No network, no model.
pub fn fallback_summary(entries: &[TranscriptEntry]) -> String {
    let all_text: String = entries
        .iter()
        .map(|entry| entry.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let need = if contains_any(&all_text, &["humain", "agent", "parler"]) {
        "Demande de parler à un agent humain"
    } else if contains_any(&all_text, &["panne", "marche pas", "problème", "erreur"]) {
        "Signalement d'un problème technique"
    } else if contains_any(&all_text, &["station", "borne"]) {
        "Question sur une borne de recharge"
    } else if contains_any(&all_text, &["rfid", "badge", "carte"]) {
        "Question sur carte RFID/badge"
    } else if contains_any(&all_text, &["paiement", "facture"]) {
        "Question sur paiement/facturation"
    } else if contains_any(&all_text, &["compte", "inscription"]) {
        "Question sur son compte"
    } else {
        "Demande d'assistance générale"
    };

    let action = if contains_any(&all_text, &["recontacter", "rappel"]) {
        "Demande de rappel enregistrée"
    } else if contains_any(&all_text, &["vérifié", "vérification"]) {
        "Vérification effectuée"
    } else if contains_any(&all_text, &["résolu", "réglé"]) {
        "Problème résolu"
    } else {
        "Informations fournies"
    };

    let mut summary = format!("Besoin: {need}\nAction: {action}");
    if contains_any(&all_text, &["humain", "rappel", "recontacter"]) {
        summary.push_str("\nRappel humain demandé");
    }
    summary
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wattline_types::TranscriptRole;

    fn entry(role: TranscriptRole, text: &str) -> TranscriptEntry {
        TranscriptEntry::now(role, text)
    }

    #[tokio::test]
    async fn empty_transcript_yields_fixed_message() {
        let summarizer = Summarizer::new(SummaryConfig::default());
        assert_eq!(
            summarizer.generate(&[]).await,
            "Aucun message dans la conversation."
        );
    }

    #[tokio::test]
    async fn unconfigured_summarizer_uses_fallback() {
        let summarizer = Summarizer::new(SummaryConfig::default());
        let entries = vec![entry(TranscriptRole::User, "Ma borne est en panne")];
        let summary = summarizer.generate(&entries).await;
        assert!(summary.contains("problème technique"), "{summary}");
    }

    #[test]
    fn fallback_detects_escalation_request() {
        let entries = vec![
            entry(TranscriptRole::User, "Je veux parler à un humain"),
            entry(TranscriptRole::Assistant, "Un agent va vous recontacter"),
        ];
        let summary = fallback_summary(&entries);
        assert!(summary.contains("agent humain"), "{summary}");
        assert!(summary.contains("Rappel humain demandé"), "{summary}");
    }

    #[test]
    fn fallback_detects_billing_topic() {
        let entries = vec![entry(TranscriptRole::User, "Une question sur ma facture")];
        let summary = fallback_summary(&entries);
        assert!(summary.contains("paiement/facturation"), "{summary}");
    }

    #[test]
    fn fallback_is_deterministic() {
        let entries = vec![entry(TranscriptRole::User, "Bonjour")];
        assert_eq!(fallback_summary(&entries), fallback_summary(&entries));
    }

    #[test]
    fn summary_config_debug_redacts_key() {
        let config = SummaryConfig {
            endpoint: "https://res.example.com".into(),
            api_key: "sk-secret".into(),
            deployment: "gpt-4o-mini".into(),
            api_version: "2024-12-01-preview".into(),
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("sk-secret"));
    }
}
