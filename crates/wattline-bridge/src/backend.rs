//! Client for the realtime speech backend.

use crate::error::BridgeError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use futures_util::{SinkExt, StreamExt};
use wattline_types::{ToolOutcome, TransportKind};

fn default_api_version() -> String {
    "2024-10-01-preview".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_temperature() -> f64 {
    0.8
}

fn default_transcription_language() -> String {
    "fr".to_string()
}

/// Connection and session settings for the speech backend.
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend host (`res.openai.azure.com`) or an explicit `ws://` /
    /// `wss://` URL. Bare hosts get `wss://` and the realtime path.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Persona instructions for the session. Content is policy, not
    /// relay logic; the bridge passes it through untouched.
    #[serde(default)]
    pub instructions: String,
    #[serde(default = "default_transcription_language")]
    pub transcription_language: String,
    /// Domain vocabulary hint for input transcription.
    #[serde(default)]
    pub transcription_prompt: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: String::new(),
            api_version: default_api_version(),
            api_key: String::new(),
            voice: default_voice(),
            temperature: default_temperature(),
            instructions: String::new(),
            transcription_language: default_transcription_language(),
            transcription_prompt: String::new(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("api_key", &"[REDACTED]")
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl BackendConfig {
    /// Builds the realtime WebSocket URL.
    pub fn url(&self) -> String {
        let base = if self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://") {
            self.endpoint.clone()
        } else {
            let host = self
                .endpoint
                .trim_start_matches("https://")
                .trim_end_matches('/');
            format!("wss://{host}/openai/realtime")
        };
        format!(
            "{base}?api-version={}&deployment={}",
            self.api_version, self.deployment
        )
    }
}

/// One backend-side duplex connection.
///
/// Owned exclusively by the session's event loop; all sends and reads
/// happen there, so ordering follows straight from call order.
pub struct RealtimeClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: BackendConfig,
}

impl RealtimeClient {
    /// Opens the backend connection. Does not configure the session yet;
    /// call [`configure`](Self::configure) next.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BridgeError> {
        let url = config.url();
        tracing::info!(endpoint = %config.endpoint, "connecting to speech backend");

        let mut request = url.into_client_request()?;
        let api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| BridgeError::Endpoint("api key is not a valid header value".into()))?;
        request.headers_mut().insert("api-key", api_key);

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("speech backend connected");

        Ok(Self {
            ws,
            config: config.clone(),
        })
    }

    /// Sends the session configuration: codec for the given transport,
    /// persona instructions, tool definitions, server VAD, and input
    /// transcription settings.
    pub async fn configure(
        &mut self,
        kind: TransportKind,
        tools: &[Value],
    ) -> Result<(), BridgeError> {
        let audio_format = kind.audio_format();
        let payload = json!({
            "type": "session.update",
            "session": {
                "turn_detection": { "type": "server_vad" },
                "input_audio_format": audio_format,
                "output_audio_format": audio_format,
                "voice": self.config.voice,
                "instructions": self.config.instructions,
                "modalities": ["text", "audio"],
                "temperature": self.config.temperature,
                "tools": tools,
                "tool_choice": "auto",
                "input_audio_transcription": {
                    "model": "whisper-1",
                    "language": self.config.transcription_language,
                    "prompt": self.config.transcription_prompt,
                },
            }
        });
        self.send_json(payload).await?;
        tracing::info!(format = audio_format, "session configuration sent");
        Ok(())
    }

    /// Appends one inbound audio frame to the backend's input buffer.
    pub async fn append_audio(&mut self, payload: &str) -> Result<(), BridgeError> {
        self.send_json(json!({
            "type": "input_audio_buffer.append",
            "audio": payload,
        }))
        .await
    }

    /// Asks the backend to start generating a response. Used for the
    /// initial greeting and to resume after a tool result.
    pub async fn create_response(&mut self) -> Result<(), BridgeError> {
        self.send_json(json!({ "type": "response.create" })).await
    }

    /// Best-effort cancellation of the in-flight response (barge-in).
    pub async fn cancel_response(&mut self) -> Result<(), BridgeError> {
        self.send_json(json!({ "type": "response.cancel" })).await
    }

    /// Submits a tool result addressed to a pending invocation. The
    /// backend does not resume on its own; follow with
    /// [`create_response`](Self::create_response).
    pub async fn submit_tool_result(
        &mut self,
        invocation_id: &str,
        outcome: &ToolOutcome,
    ) -> Result<(), BridgeError> {
        let output = serde_json::to_string(outcome)
            .unwrap_or_else(|_| r#"{"success":false,"error":"unserializable result"}"#.to_string());
        self.send_json(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": invocation_id,
                "output": output,
            }
        }))
        .await
    }

    async fn send_json(&mut self, value: Value) -> Result<(), BridgeError> {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(BridgeError::Send)
    }

    /// Next raw message from the backend. `None` means the connection
    /// is gone.
    pub async fn next_message(
        &mut self,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        self.ws.next().await
    }

    /// Best-effort close of the backend connection.
    pub async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!("backend close: {e}");
        }
    }
}
