//! Event types for both duplex sides of a session.
//!
//! Caller-side events arrive pre-normalized: the phone and browser
//! adapters translate their wire formats into [`CallEvent`] before the
//! bridge sees them. Backend-side events are deserialized here from the
//! realtime protocol's tagged JSON messages.
//!
//! Both enums are closed: the bridge handles every variant via
//! exhaustive matching, and a new variant is a compile-time error until
//! every handler covers it. Messages that do not parse into a known
//! variant are dropped at the boundary with a debug log.

use serde::Deserialize;
use serde_json::Value;

/// Normalized inbound events from the caller side.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The caller-side connection is established.
    Connected,
    /// The media stream started; carries the provider identifiers and
    /// the caller identity passed through the stream handshake.
    Started {
        stream_id: Option<String>,
        call_id: Option<String>,
        caller: Option<String>,
    },
    /// One inbound audio frame (base64 payload in the session codec).
    Media { payload: String },
    /// The provider stopped the stream; begin teardown.
    Stopped,
    /// The caller-side socket closed.
    Closed,
}

/// Inbound events from the realtime speech backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BackendEvent {
    /// Handshake complete; audio may flow.
    #[serde(rename = "session.created")]
    SessionCreated,

    /// Session configuration acknowledged.
    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// One chunk of synthesized outbound audio.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    /// The audio portion of the current response is complete.
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// The whole response is complete; carries the final output items.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseBody>,
    },

    /// Server-side VAD detected the user speaking (barge-in signal).
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Server-side VAD detected the user stopped speaking.
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Final recognized text for a user turn.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// The backend requests a tool invocation.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallDone {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        /// JSON-encoded argument object.
        #[serde(default)]
        arguments: Option<String>,
    },

    /// Backend error notification. Not necessarily fatal to the session.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<Value>,
    },
}

impl BackendEvent {
    /// Parses a raw backend message.
    ///
    /// Returns `None` for message types the bridge does not handle
    /// (there are many benign ones — `response.created`, rate-limit
    /// updates, item lifecycle events); those are logged at debug level
    /// and dropped. Malformed JSON is logged at warn level and dropped.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(raw) {
            Ok(event) => Some(event),
            Err(_) => {
                match serde_json::from_str::<Value>(raw) {
                    Ok(value) => {
                        let kind = value
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("<missing type>");
                        tracing::debug!("unhandled backend message type: {kind}");
                    }
                    Err(e) => {
                        tracing::warn!("malformed backend message dropped: {e}");
                    }
                }
                None
            }
        }
    }
}

/// Final output of a completed response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// A content part of an output message: plain text, or audio with an
/// accompanying transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ResponseBody {
    /// Extracts the assistant's final spoken/written text for the
    /// transcript: `text` parts verbatim, `audio` parts via their
    /// transcript.
    pub fn assistant_texts(&self) -> Vec<&str> {
        let mut texts = Vec::new();
        for item in &self.output {
            if item.kind != "message" {
                continue;
            }
            for part in &item.content {
                match part.kind.as_str() {
                    "text" => {
                        if let Some(text) = part.text.as_deref() {
                            texts.push(text);
                        }
                    }
                    "audio" => {
                        if let Some(transcript) = part.transcript.as_deref() {
                            texts.push(transcript);
                        }
                    }
                    _ => {}
                }
            }
        }
        texts
    }
}
