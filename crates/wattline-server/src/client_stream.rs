//! Browser client endpoint and the browser transport adapter.
//!
//! The browser speaks a small JSON protocol over WebSocket: it sends
//! PCM16 audio chunks and session control, and receives audio plus the
//! UX signals the phone wire cannot express (status, live transcript
//! lines, tool progress).

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use wattline_bridge::{run_session, CallEvent, CallTransport, ToolStatus, TransportSignal};
use wattline_types::{SessionIdentity, TransportKind};

const OUTBOUND_QUEUE: usize = 256;
const CALL_QUEUE: usize = 256;

/// Inbound messages from the browser client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Audio { audio: String },
    Ping,
    EndSession,
}

fn parse_frame(raw: &str) -> Option<ClientFrame> {
    match serde_json::from_str::<ClientFrame>(raw) {
        Ok(frame) => Some(frame),
        Err(_) => {
            let kind = serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| "<unparseable>".to_string());
            tracing::debug!("unhandled client frame: {kind}");
            None
        }
    }
}

/// Caller-side adapter for browser clients. Every bridge signal maps to
/// a client JSON message.
struct BrowserTransport {
    outbound: mpsc::Sender<String>,
}

impl BrowserTransport {
    fn send(&self, message: Value) {
        if let Err(e) = self.outbound.try_send(message.to_string()) {
            tracing::warn!("dropping outbound message for slow browser client: {e}");
        }
    }
}

impl CallTransport for BrowserTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Browser
    }

    fn send_audio(&self, payload: &str) {
        self.send(json!({ "type": "audio", "audio": payload }));
    }

    fn clear_playback(&self) {
        self.send(json!({ "type": "clear" }));
    }

    fn mark_turn_complete(&self) {
        self.send(json!({ "type": "audio_done" }));
    }

    fn notify(&self, signal: TransportSignal) {
        let message = match signal {
            TransportSignal::Ready => json!({ "type": "status", "status": "ready" }),
            TransportSignal::Disconnected => {
                json!({ "type": "status", "status": "disconnected" })
            }
            TransportSignal::SpeechStarted => json!({ "type": "speech_started" }),
            TransportSignal::SpeechStopped => json!({ "type": "speech_stopped" }),
            TransportSignal::ResponseComplete => json!({ "type": "response_done" }),
            TransportSignal::Transcript { role, text } => {
                json!({ "type": "transcript", "role": role.as_str(), "text": text })
            }
            TransportSignal::ToolStatus { name, status } => {
                let status = match status {
                    ToolStatus::Executing => "executing",
                    ToolStatus::Completed => "completed",
                    ToolStatus::Failed => "error",
                };
                json!({ "type": "tool_call", "name": name, "status": status })
            }
            TransportSignal::Error { message } => {
                json!({ "type": "error", "message": message })
            }
        };
        self.send(message);
    }
}

/// `GET /client-stream` — WebSocket upgrade for browser clients.
pub async fn client_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state))
}

async fn handle_client_socket(socket: WebSocket, state: Arc<AppState>) {
    let identity = SessionIdentity::web();
    tracing::info!(session_id = %identity.session_id, "web client connected");

    let (mut sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    let transport = BrowserTransport {
        outbound: out_tx.clone(),
    };

    let (call_tx, call_rx) = mpsc::channel(CALL_QUEUE);
    let session = tokio::spawn(run_session(
        transport,
        call_rx,
        state.config.backend.clone(),
        state.services.clone(),
        identity,
    ));

    // Browser sessions have no provider start frame; the session starts
    // as soon as the socket is up.
    let _ = call_tx
        .send(CallEvent::Started {
            stream_id: None,
            call_id: None,
            caller: None,
        })
        .await;

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let Some(frame) = parse_frame(text.as_str()) else {
                    continue;
                };
                match frame {
                    ClientFrame::Audio { audio } => {
                        if call_tx.send(CallEvent::Media { payload: audio }).await.is_err() {
                            break;
                        }
                    }
                    ClientFrame::Ping => {
                        // Liveness is transport-local; answered here, not relayed.
                        if out_tx.try_send(json!({ "type": "pong" }).to_string()).is_err() {
                            tracing::warn!("dropping pong for slow browser client");
                        }
                    }
                    ClientFrame::EndSession => {
                        tracing::info!("web client requested session end");
                        let _ = call_tx.send(CallEvent::Stopped).await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = call_tx.try_send(CallEvent::Closed);
    drop(call_tx);

    if let Err(e) = session.await {
        tracing::error!("session task failed: {e}");
    }
    send_task.abort();
}
