//! Telephony media-stream endpoint and the phone transport adapter.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;
use wattline_bridge::{run_session, CallEvent, CallTransport, TransportSignal};
use wattline_types::{SessionIdentity, TransportKind};

/// Bound on queued outbound frames per connection. Beyond this the
/// provider is too slow and frames are dropped with a warning.
const OUTBOUND_QUEUE: usize = 256;

/// Bound on inbound call events queued toward the session loop.
const CALL_QUEUE: usize = 256;

/// Inbound frames of the provider's media-stream protocol.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ProviderFrame {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaFrame },
    Stop,
    /// Playback-marker echo; the relay does not sequence on it.
    Mark,
}

#[derive(Debug, Deserialize)]
struct StartMeta {
    #[serde(rename = "streamSid", default)]
    stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MediaFrame {
    payload: String,
}

/// Parses a provider frame; unknown events are logged and dropped.
fn parse_frame(raw: &str) -> Option<ProviderFrame> {
    match serde_json::from_str::<ProviderFrame>(raw) {
        Ok(frame) => Some(frame),
        Err(_) => {
            let kind = serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|v| v.get("event").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| "<unparseable>".to_string());
            tracing::debug!("unhandled provider frame: {kind}");
            None
        }
    }
}

/// Caller-side adapter for the telephony provider.
///
/// Outbound frames are addressed by the provider-assigned stream id,
/// captured from the start frame before the bridge sees it. Signals the
/// wire protocol cannot express are dropped.
struct PhoneTransport {
    outbound: mpsc::Sender<String>,
    stream_sid: Arc<Mutex<Option<String>>>,
}

impl PhoneTransport {
    fn stream_sid(&self) -> Option<String> {
        self.stream_sid.lock().expect("stream sid lock").clone()
    }

    fn send(&self, message: String) {
        if let Err(e) = self.outbound.try_send(message) {
            tracing::warn!("dropping outbound frame for slow provider connection: {e}");
        }
    }
}

impl CallTransport for PhoneTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Phone
    }

    fn send_audio(&self, payload: &str) {
        let Some(sid) = self.stream_sid() else {
            tracing::warn!("dropping outbound audio: stream not started");
            return;
        };
        self.send(
            json!({
                "event": "media",
                "streamSid": sid,
                "media": { "payload": payload },
            })
            .to_string(),
        );
    }

    fn clear_playback(&self) {
        let Some(sid) = self.stream_sid() else {
            return;
        };
        self.send(json!({ "event": "clear", "streamSid": sid }).to_string());
    }

    fn mark_turn_complete(&self) {
        let Some(sid) = self.stream_sid() else {
            return;
        };
        self.send(
            json!({
                "event": "mark",
                "streamSid": sid,
                "mark": { "name": "response-complete" },
            })
            .to_string(),
        );
    }

    fn notify(&self, signal: TransportSignal) {
        match signal {
            TransportSignal::Error { message } => {
                tracing::debug!("phone transport cannot surface error: {message}");
            }
            TransportSignal::Ready
            | TransportSignal::Disconnected
            | TransportSignal::SpeechStarted
            | TransportSignal::SpeechStopped
            | TransportSignal::ResponseComplete
            | TransportSignal::Transcript { .. }
            | TransportSignal::ToolStatus { .. } => {}
        }
    }
}

/// `GET /voice/media-stream` — WebSocket upgrade for the provider's
/// media stream.
pub async fn media_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::info!("telephony media stream connection established");
    ws.on_upgrade(move |socket| handle_phone_socket(socket, state))
}

async fn handle_phone_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    let stream_sid = Arc::new(Mutex::new(None));
    let transport = PhoneTransport {
        outbound: out_tx,
        stream_sid: stream_sid.clone(),
    };

    // Caller identity arrives with the start frame; until then the
    // session logs under a provisional id.
    let identity = SessionIdentity {
        session_id: format!("tel-pending-{}", Uuid::new_v4()),
        ..Default::default()
    };

    let (call_tx, call_rx) = mpsc::channel(CALL_QUEUE);
    let session = tokio::spawn(run_session(
        transport,
        call_rx,
        state.config.backend.clone(),
        state.services.clone(),
        identity,
    ));

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let Some(frame) = parse_frame(text.as_str()) else {
                    continue;
                };
                let event = match frame {
                    ProviderFrame::Connected => CallEvent::Connected,
                    ProviderFrame::Start { start } => {
                        *stream_sid.lock().expect("stream sid lock") = start.stream_sid.clone();
                        CallEvent::Started {
                            stream_id: start.stream_sid,
                            call_id: start.call_sid,
                            caller: start.custom_parameters.get("callerNumber").cloned(),
                        }
                    }
                    ProviderFrame::Media { media } => CallEvent::Media {
                        payload: media.payload,
                    },
                    ProviderFrame::Stop => CallEvent::Stopped,
                    ProviderFrame::Mark => continue,
                };
                if call_tx.send(event).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Dropping the sender tells the session the caller side is gone;
    // an explicit Closed covers the case where the queue still drains.
    let _ = call_tx.try_send(CallEvent::Closed);
    drop(call_tx);

    if let Err(e) = session.await {
        tracing::error!("session task failed: {e}");
    }
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_frame_parses_identifiers_and_parameters() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ456",
                "callSid": "CA123",
                "customParameters": { "callerNumber": "+33600000000" }
            },
            "streamSid": "MZ456"
        }"#;
        let Some(ProviderFrame::Start { start }) = parse_frame(raw) else {
            panic!("expected start frame");
        };
        assert_eq!(start.stream_sid.as_deref(), Some("MZ456"));
        assert_eq!(start.call_sid.as_deref(), Some("CA123"));
        assert_eq!(
            start.custom_parameters.get("callerNumber").map(String::as_str),
            Some("+33600000000")
        );
    }

    #[test]
    fn media_frame_parses_payload() {
        let raw = r#"{"event":"media","media":{"track":"inbound","payload":"AAAA"}}"#;
        let Some(ProviderFrame::Media { media }) = parse_frame(raw) else {
            panic!("expected media frame");
        };
        assert_eq!(media.payload, "AAAA");
    }

    #[test]
    fn unknown_frames_drop_to_none() {
        assert!(parse_frame(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).is_none());
        assert!(parse_frame("garbage").is_none());
    }
}
