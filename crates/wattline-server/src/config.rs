//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use wattline_bridge::BackendConfig;
use wattline_tools::ActionConfig;
use wattline_transcript::{HelpdeskConfig, SummaryConfig};

/// Default persona instructions. Deployments override this with their
/// full conversation script via `backend.instructions` in the config
/// file; the relay passes whatever is configured through untouched.
const DEFAULT_INSTRUCTIONS: &str = "Tu es un agent du support client d'un réseau de bornes \
de recharge pour véhicules électriques. Réponds en français, de façon concise et orientée \
action. Vérifie toujours les informations avec un outil avant de proposer une solution, et \
propose un agent humain via l'outil priority quand la situation l'exige.";

/// Default vocabulary hint for input transcription.
const DEFAULT_TRANSCRIPTION_PROMPT: &str = "Vocabulaire: relais, borne de recharge, station, \
Carrefour, connecteur, RFID, wattzhub, véhicule électrique, recharge, câble, prise. Noms de \
lieux et stations de recharge en France.";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Speech backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Action (tool webhook) settings.
    #[serde(default)]
    pub actions: ActionConfig,

    /// Helpdesk (conversation tracking) settings.
    #[serde(default)]
    pub helpdesk: HelpdeskConfig,

    /// Summarization settings.
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Escalation settings.
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Transcript persistence settings.
    #[serde(default)]
    pub transcripts: TranscriptConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible hostname used in call-control instructions
    /// (the telephony provider must be able to reach it). Falls back to
    /// the request's Host header when empty.
    #[serde(default)]
    pub public_host: String,
}

/// Human escalation settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EscalationConfig {
    /// Number calls are transferred to when handed off to a human.
    #[serde(default)]
    pub forward_number: String,
}

/// Transcript persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptConfig {
    /// Directory for per-session transcript logs. Empty disables file
    /// persistence.
    #[serde(default = "default_transcript_dir")]
    pub dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "wattline_bridge=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8080
}

fn default_transcript_dir() -> String {
    "logs/conversations".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_host: String::new(),
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: default_transcript_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WATTLINE_HOST`, `WATTLINE_PORT`, `WATTLINE_PUBLIC_HOST`
/// - `WATTLINE_BACKEND_ENDPOINT`, `WATTLINE_BACKEND_DEPLOYMENT`,
///   `WATTLINE_BACKEND_API_KEY`, `WATTLINE_BACKEND_API_VERSION`
/// - `WATTLINE_ACTIONS_BASE_URL`, `WATTLINE_ACTIONS_TOKEN`
/// - `WATTLINE_HELPDESK_URL`, `WATTLINE_HELPDESK_ACCOUNT_ID`,
///   `WATTLINE_HELPDESK_INBOX_ID`, `WATTLINE_HELPDESK_TOKEN`
/// - `WATTLINE_SUMMARY_ENDPOINT`, `WATTLINE_SUMMARY_API_KEY`,
///   `WATTLINE_SUMMARY_DEPLOYMENT`
/// - `WATTLINE_ESCALATION_NUMBER`
/// - `WATTLINE_TRANSCRIPT_DIR`
/// - `WATTLINE_LOG_LEVEL`, `WATTLINE_LOG_JSON` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config);

    if config.backend.instructions.is_empty() {
        config.backend.instructions = DEFAULT_INSTRUCTIONS.to_string();
    }
    if config.backend.transcription_prompt.is_empty() {
        config.backend.transcription_prompt = DEFAULT_TRANSCRIPTION_PROMPT.to_string();
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = std::env::var("WATTLINE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("WATTLINE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(host) = std::env::var("WATTLINE_PUBLIC_HOST") {
        config.server.public_host = host;
    }
    if let Ok(endpoint) = std::env::var("WATTLINE_BACKEND_ENDPOINT") {
        config.backend.endpoint = endpoint;
    }
    if let Ok(deployment) = std::env::var("WATTLINE_BACKEND_DEPLOYMENT") {
        config.backend.deployment = deployment;
    }
    if let Ok(key) = std::env::var("WATTLINE_BACKEND_API_KEY") {
        config.backend.api_key = key;
    }
    if let Ok(version) = std::env::var("WATTLINE_BACKEND_API_VERSION") {
        config.backend.api_version = version;
    }
    if let Ok(base_url) = std::env::var("WATTLINE_ACTIONS_BASE_URL") {
        config.actions.base_url = base_url;
    }
    if let Ok(token) = std::env::var("WATTLINE_ACTIONS_TOKEN") {
        config.actions.api_token = Some(token);
    }
    if let Ok(url) = std::env::var("WATTLINE_HELPDESK_URL") {
        config.helpdesk.url = url;
    }
    if let Ok(account_id) = std::env::var("WATTLINE_HELPDESK_ACCOUNT_ID") {
        config.helpdesk.account_id = account_id;
    }
    if let Ok(inbox_id) = std::env::var("WATTLINE_HELPDESK_INBOX_ID") {
        config.helpdesk.inbox_id = inbox_id;
    }
    if let Ok(token) = std::env::var("WATTLINE_HELPDESK_TOKEN") {
        config.helpdesk.api_token = token;
    }
    if let Ok(endpoint) = std::env::var("WATTLINE_SUMMARY_ENDPOINT") {
        config.summary.endpoint = endpoint;
    }
    if let Ok(key) = std::env::var("WATTLINE_SUMMARY_API_KEY") {
        config.summary.api_key = key;
    }
    if let Ok(deployment) = std::env::var("WATTLINE_SUMMARY_DEPLOYMENT") {
        config.summary.deployment = deployment;
    }
    if let Ok(number) = std::env::var("WATTLINE_ESCALATION_NUMBER") {
        config.escalation.forward_number = number;
    }
    if let Ok(dir) = std::env::var("WATTLINE_TRANSCRIPT_DIR") {
        config.transcripts.dir = dir;
    }
    if let Ok(level) = std::env::var("WATTLINE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("WATTLINE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = load_config(None).expect("defaults load");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.transcripts.dir, "logs/conversations");
        assert!(!config.backend.instructions.is_empty());
        assert!(!config.backend.transcription_prompt.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("definitely-not-there.toml")).expect("defaults load");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn file_values_are_loaded() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        writeln!(
            file,
            r#"
[server]
port = 9090
public_host = "relay.example.com"

[backend]
endpoint = "res.openai.azure.com"
deployment = "gpt-4o-realtime"
api_key = "sk-test"
voice = "echo"

[helpdesk]
url = "https://desk.example.com"
account_id = "1"
inbox_id = "2"
api_token = "tok"

[escalation]
forward_number = "+33123456789"
"#
        )
        .expect("write temp config");

        let config = load_config(file.path().to_str()).expect("config loads");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.public_host, "relay.example.com");
        assert_eq!(config.backend.voice, "echo");
        assert_eq!(config.backend.api_version, "2024-10-01-preview");
        assert!(config.helpdesk.is_configured());
        assert_eq!(config.escalation.forward_number, "+33123456789");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        writeln!(file, "not valid toml [[[").expect("write temp config");
        assert!(load_config(file.path().to_str()).is_err());
    }
}
