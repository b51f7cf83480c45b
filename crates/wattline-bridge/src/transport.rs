//! The caller-side transport abstraction.

use wattline_types::{TranscriptRole, TransportKind};

/// Progress of a tool invocation, surfaced to transports that can show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Executing,
    Completed,
    Failed,
}

/// Out-of-band signals from the bridge to the caller side.
///
/// Audio has its own dedicated methods on [`CallTransport`]; everything
/// else flows through here. A transport forwards what its protocol can
/// express and ignores the rest — the phone adapter drops nearly all of
/// these, the browser adapter turns them into client JSON messages.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The backend session is configured and responding.
    Ready,
    /// The backend side is gone; the session is ending.
    Disconnected,
    /// The user started speaking (barge-in).
    SpeechStarted,
    /// The user stopped speaking.
    SpeechStopped,
    /// The backend finished a full response turn.
    ResponseComplete,
    /// A finalized transcript line.
    Transcript { role: TranscriptRole, text: String },
    /// Tool invocation progress.
    ToolStatus { name: String, status: ToolStatus },
    /// A non-fatal error the caller side may want to surface.
    Error { message: String },
}

/// Capability interface the bridge uses to talk to the caller side.
///
/// Implementations must not block: sends go through the connection's
/// bounded outbound queue and drop with a warning when the consumer is
/// too slow (never stalling the relay loop).
pub trait CallTransport: Send + 'static {
    /// Which transport this is; selects the backend audio codec.
    fn kind(&self) -> TransportKind;

    /// Queues one outbound audio chunk (base64 payload) for playback.
    fn send_audio(&self, payload: &str);

    /// Discards audio queued for playback that has not yet been played.
    /// Invoked on barge-in, always before the backend cancellation.
    fn clear_playback(&self);

    /// Marks the end of the current response's audio so the caller side
    /// can sequence playback completion.
    fn mark_turn_complete(&self);

    /// Delivers an out-of-band signal.
    fn notify(&self, signal: TransportSignal);
}
