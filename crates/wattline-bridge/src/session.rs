//! The per-session relay loop.

use crate::backend::{BackendConfig, RealtimeClient};
use crate::error::BridgeError;
use crate::protocol::{BackendEvent, CallEvent};
use crate::transport::{CallTransport, ToolStatus, TransportSignal};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tokio::sync::mpsc;
use wattline_tools::{schema, ToolInvoker, ToolOutcome};
use wattline_transcript::{HelpdeskClient, Summarizer, TranscriptRecorder};
use wattline_types::{SessionIdentity, TranscriptRole};

/// Bound on audio frames buffered before the backend handshake
/// completes. At 20 ms telephony framing this holds roughly ten seconds;
/// beyond that the oldest frames are dropped — the newest audio is what
/// the backend needs to react to once it is ready.
const MAX_PENDING_AUDIO_FRAMES: usize = 512;

/// Capacity of the per-session tool-completion queue.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Shared collaborators handed to each session. Cheap to clone; the
/// HTTP clients inside pool connections.
#[derive(Clone)]
pub struct SessionServices {
    pub invoker: ToolInvoker,
    pub helpdesk: HelpdeskClient,
    pub summarizer: Summarizer,
    /// Directory for durable per-session transcript logs; `None`
    /// disables file persistence.
    pub transcript_dir: Option<PathBuf>,
}

/// Completion of an asynchronously dispatched tool call, posted back
/// into the session's own event queue.
struct ToolCompletion {
    name: String,
    invocation_id: String,
    outcome: ToolOutcome,
}

/// Runs one call session to completion.
///
/// Owns both duplex connections for the lifetime of the call: caller
/// events arrive on `calls`, backend events on the realtime connection
/// opened here. Returns once the session is fully torn down; the caller
/// (the WebSocket handler) only has to keep feeding `calls`.
pub async fn run_session<T: CallTransport>(
    transport: T,
    calls: mpsc::Receiver<CallEvent>,
    backend_config: BackendConfig,
    services: SessionServices,
    identity: SessionIdentity,
) {
    let session_id = identity.session_id.clone();

    let mut client = match RealtimeClient::connect(&backend_config).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(session_id = %session_id, "backend connection failed: {e}");
            transport.notify(TransportSignal::Error {
                message: "speech backend connection failed".to_string(),
            });
            transport.notify(TransportSignal::Disconnected);
            return;
        }
    };

    let tools = schema::definitions();
    if let Err(e) = client.configure(transport.kind(), &tools).await {
        tracing::error!(session_id = %session_id, "session configuration failed: {e}");
        transport.notify(TransportSignal::Disconnected);
        return;
    }

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let mut relay = Relay {
        transport,
        services,
        identity,
        command_tx,
        backend_ready: false,
        response_active: false,
        pending_audio: VecDeque::new(),
        dropped_frames: 0,
        processed_invocations: HashSet::new(),
        recorder: None,
        closing: false,
    };

    relay.run(&mut client, calls, command_rx).await;
    tracing::info!(session_id = %session_id, "session ended");
}

/// All mutable state for one session. Mutated only by [`Relay::run`]'s
/// event-handling path; no locking needed because there is no
/// concurrent mutation within a session.
struct Relay<T: CallTransport> {
    transport: T,
    services: SessionServices,
    identity: SessionIdentity,
    command_tx: mpsc::Sender<ToolCompletion>,
    backend_ready: bool,
    response_active: bool,
    pending_audio: VecDeque<String>,
    dropped_frames: u64,
    processed_invocations: HashSet<String>,
    recorder: Option<TranscriptRecorder>,
    closing: bool,
}

impl<T: CallTransport> Relay<T> {
    async fn run(
        &mut self,
        client: &mut RealtimeClient,
        mut calls: mpsc::Receiver<CallEvent>,
        mut commands: mpsc::Receiver<ToolCompletion>,
    ) {
        loop {
            tokio::select! {
                maybe_message = client.next_message() => {
                    match maybe_message {
                        Some(Ok(message)) => {
                            if let Some(text) = message_text(&message) {
                                if let Some(event) = BackendEvent::parse(text) {
                                    if let Err(e) = self.on_backend_event(client, event).await {
                                        tracing::error!(
                                            session_id = %self.identity.session_id,
                                            "backend send failed: {e}"
                                        );
                                        self.teardown(client).await;
                                        break;
                                    }
                                }
                            } else if message.is_close() {
                                tracing::info!(session_id = %self.identity.session_id, "backend closed the connection");
                                self.teardown(client).await;
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(session_id = %self.identity.session_id, "backend connection error: {e}");
                            self.teardown(client).await;
                            break;
                        }
                        None => {
                            tracing::info!(session_id = %self.identity.session_id, "backend connection ended");
                            self.teardown(client).await;
                            break;
                        }
                    }
                }

                maybe_event = calls.recv() => {
                    let event = maybe_event.unwrap_or(CallEvent::Closed);
                    let stop = matches!(event, CallEvent::Stopped | CallEvent::Closed);
                    if let Err(e) = self.on_call_event(client, event).await {
                        tracing::error!(session_id = %self.identity.session_id, "backend send failed: {e}");
                        self.teardown(client).await;
                        break;
                    }
                    if stop {
                        self.teardown(client).await;
                        break;
                    }
                }

                Some(completion) = commands.recv() => {
                    if let Err(e) = self.on_tool_completion(client, completion).await {
                        tracing::error!(session_id = %self.identity.session_id, "backend send failed: {e}");
                        self.teardown(client).await;
                        break;
                    }
                }
            }
        }
    }

    async fn on_call_event(
        &mut self,
        client: &mut RealtimeClient,
        event: CallEvent,
    ) -> Result<(), BridgeError> {
        match event {
            CallEvent::Connected => {
                tracing::info!(session_id = %self.identity.session_id, "caller-side stream connected");
            }
            CallEvent::Started { stream_id, call_id, caller } => {
                if let Some(caller) = caller {
                    if self.identity.caller.is_none() {
                        self.identity = SessionIdentity::phone(&caller);
                    }
                }
                self.identity.stream_id = stream_id;
                self.identity.call_id = call_id;
                tracing::info!(
                    session_id = %self.identity.session_id,
                    call_id = self.identity.call_id.as_deref().unwrap_or("-"),
                    stream_id = self.identity.stream_id.as_deref().unwrap_or("-"),
                    "stream started"
                );
                self.recorder = Some(TranscriptRecorder::new(
                    self.identity.clone(),
                    self.services.helpdesk.clone(),
                    self.services.summarizer.clone(),
                    self.services.transcript_dir.as_deref(),
                ));
            }
            CallEvent::Media { payload } => {
                if self.backend_ready {
                    client.append_audio(&payload).await?;
                } else {
                    if self.pending_audio.len() >= MAX_PENDING_AUDIO_FRAMES {
                        self.pending_audio.pop_front();
                        if self.dropped_frames == 0 {
                            tracing::warn!(
                                session_id = %self.identity.session_id,
                                "pending audio buffer full, dropping oldest frames"
                            );
                        }
                        self.dropped_frames += 1;
                    }
                    self.pending_audio.push_back(payload);
                }
            }
            CallEvent::Stopped => {
                tracing::info!(session_id = %self.identity.session_id, "caller-side stream stopped");
            }
            CallEvent::Closed => {
                tracing::info!(session_id = %self.identity.session_id, "caller-side connection closed");
            }
        }
        Ok(())
    }

    async fn on_backend_event(
        &mut self,
        client: &mut RealtimeClient,
        event: BackendEvent,
    ) -> Result<(), BridgeError> {
        match event {
            BackendEvent::SessionCreated => {
                tracing::info!(session_id = %self.identity.session_id, "backend session created");
                self.backend_ready = true;
                self.flush_pending_audio(client).await?;
            }
            BackendEvent::SessionUpdated => {
                tracing::info!(session_id = %self.identity.session_id, "backend session configured");
                self.backend_ready = true;
                self.flush_pending_audio(client).await?;
                self.transport.notify(TransportSignal::Ready);
                // The backend does not speak first on its own.
                client.create_response().await?;
            }
            BackendEvent::AudioDelta { delta } => {
                self.response_active = true;
                if let Some(delta) = delta {
                    self.transport.send_audio(&delta);
                }
            }
            BackendEvent::AudioDone => {
                self.response_active = false;
                self.transport.mark_turn_complete();
            }
            BackendEvent::SpeechStarted => {
                tracing::info!(session_id = %self.identity.session_id, "user started speaking");
                self.transport.notify(TransportSignal::SpeechStarted);
                // Clear the downstream playback buffer before cancelling,
                // so no stale audio plays even if cancellation races.
                self.transport.clear_playback();
                if self.response_active {
                    client.cancel_response().await?;
                    self.response_active = false;
                    tracing::info!(session_id = %self.identity.session_id, "cancelled active response on barge-in");
                }
            }
            BackendEvent::SpeechStopped => {
                tracing::debug!(session_id = %self.identity.session_id, "user stopped speaking");
                self.transport.notify(TransportSignal::SpeechStopped);
            }
            BackendEvent::TranscriptionCompleted { transcript } => {
                if let Some(text) = transcript.filter(|t| !t.is_empty()) {
                    self.append_transcript(TranscriptRole::User, &text).await;
                }
            }
            BackendEvent::ResponseDone { response } => {
                if let Some(body) = response {
                    let texts: Vec<String> =
                        body.assistant_texts().into_iter().map(String::from).collect();
                    for text in texts {
                        self.append_transcript(TranscriptRole::Assistant, &text).await;
                    }
                }
                self.transport.notify(TransportSignal::ResponseComplete);
            }
            BackendEvent::FunctionCallDone { name, call_id, arguments } => {
                if let (Some(name), Some(call_id)) = (name, call_id) {
                    self.dispatch_tool(name, call_id, arguments);
                }
            }
            BackendEvent::Error { error } => {
                self.on_backend_error(error);
            }
        }
        Ok(())
    }

    async fn flush_pending_audio(&mut self, client: &mut RealtimeClient) -> Result<(), BridgeError> {
        if self.dropped_frames > 0 {
            tracing::warn!(
                session_id = %self.identity.session_id,
                dropped = self.dropped_frames,
                "dropped oldest pending audio frames before backend became ready"
            );
            self.dropped_frames = 0;
        }
        while let Some(payload) = self.pending_audio.pop_front() {
            client.append_audio(&payload).await?;
        }
        Ok(())
    }

    async fn append_transcript(&mut self, role: TranscriptRole, text: &str) {
        match self.recorder.as_mut() {
            Some(recorder) => match role {
                TranscriptRole::User => recorder.append_user(text).await,
                TranscriptRole::Assistant => recorder.append_assistant(text).await,
            },
            None => {
                tracing::warn!(
                    session_id = %self.identity.session_id,
                    "transcript line before stream start dropped"
                );
                return;
            }
        }
        self.transport.notify(TransportSignal::Transcript {
            role,
            text: text.to_string(),
        });
    }

    /// Spawns the tool invocation and returns immediately; the result
    /// comes back through the session's command queue. Duplicate
    /// invocation ids are ignored — the backend may resend a call.
    fn dispatch_tool(&mut self, name: String, invocation_id: String, arguments: Option<String>) {
        if !self.processed_invocations.insert(invocation_id.clone()) {
            tracing::info!(
                session_id = %self.identity.session_id,
                tool = %name,
                invocation_id = %invocation_id,
                "skipping duplicate tool call"
            );
            return;
        }

        tracing::info!(
            session_id = %self.identity.session_id,
            tool = %name,
            invocation_id = %invocation_id,
            "tool call received"
        );
        self.transport.notify(TransportSignal::ToolStatus {
            name: name.clone(),
            status: ToolStatus::Executing,
        });

        let parsed: Result<Value, _> =
            serde_json::from_str(arguments.as_deref().unwrap_or("{}"));
        let invoker = self.services.invoker.clone();
        let identity = self.identity.clone();
        let tx = self.command_tx.clone();

        tokio::spawn(async move {
            let outcome = match parsed {
                Ok(args) => invoker.invoke(&name, &args, &identity).await,
                Err(e) => {
                    tracing::error!(
                        session_id = %identity.session_id,
                        tool = %name,
                        "unparseable tool arguments: {e}"
                    );
                    ToolOutcome::err(format!("Tool execution failed: {e}"))
                }
            };
            let _ = tx
                .send(ToolCompletion {
                    name,
                    invocation_id,
                    outcome,
                })
                .await;
        });
    }

    async fn on_tool_completion(
        &mut self,
        client: &mut RealtimeClient,
        completion: ToolCompletion,
    ) -> Result<(), BridgeError> {
        let ToolCompletion {
            name,
            invocation_id,
            outcome,
        } = completion;

        tracing::info!(
            session_id = %self.identity.session_id,
            tool = %name,
            invocation_id = %invocation_id,
            success = outcome.success,
            "tool call completed"
        );

        // A successful escalation marks the conversation for human
        // follow-up; the helpdesk record becomes urgent at flush time.
        if name == "priority" && outcome.success {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.mark_escalation_requested();
            }
        }

        self.transport.notify(TransportSignal::ToolStatus {
            name,
            status: if outcome.success {
                ToolStatus::Completed
            } else {
                ToolStatus::Failed
            },
        });

        client.submit_tool_result(&invocation_id, &outcome).await?;
        client.create_response().await
    }

    fn on_backend_error(&self, error: Option<Value>) {
        let detail = error.unwrap_or(Value::Null);
        let kind = detail.get("type").and_then(Value::as_str).unwrap_or("-");
        let code = detail.get("code").and_then(Value::as_str).unwrap_or("-");
        let message = detail
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown backend error");
        tracing::error!(
            session_id = %self.identity.session_id,
            kind = kind,
            code = code,
            "backend error: {message}"
        );
        self.transport.notify(TransportSignal::Error {
            message: message.to_string(),
        });
    }

    /// Tears both sides down. Idempotent: guarded by `closing`, so the
    /// cascade (caller close → backend close, or the reverse) cannot
    /// double-flush the transcript.
    async fn teardown(&mut self, client: &mut RealtimeClient) {
        if self.closing {
            return;
        }
        self.closing = true;

        client.close().await;
        self.transport.notify(TransportSignal::Disconnected);

        if let Some(recorder) = self.recorder.take() {
            let result = recorder.close().await;
            if result.success {
                tracing::info!(
                    session_id = %self.identity.session_id,
                    conversation_id = result.conversation_id,
                    messages = result.message_count,
                    "transcript forwarded"
                );
            } else {
                tracing::info!(
                    session_id = %self.identity.session_id,
                    reason = result.reason.as_deref().unwrap_or("-"),
                    "transcript not forwarded"
                );
            }
        }
    }
}

fn message_text(message: &tokio_tungstenite::tungstenite::Message) -> Option<&str> {
    match message {
        tokio_tungstenite::tungstenite::Message::Text(text) => Some(text.as_str()),
        _ => None,
    }
}
