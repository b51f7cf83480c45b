//! Call entry: the inbound-call webhook and the stream-end callback.

use crate::{twiml, AppState};
use axum::extract::Form;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;
use std::sync::Arc;

/// Parameters of the provider's inbound-call webhook.
#[derive(Debug, Deserialize)]
pub struct IncomingCallParams {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
}

/// Parameters of the stream-end callback.
#[derive(Debug, Deserialize)]
pub struct StreamEndedParams {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

fn resolve_host(state: &AppState, headers: &HeaderMap) -> String {
    if !state.config.server.public_host.is_empty() {
        return state.config.server.public_host.clone();
    }
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

/// `GET|POST /voice/incoming` — answers the provider's inbound-call
/// notification with instructions to open a media stream to this
/// server, carrying the caller number into the stream handshake.
pub async fn incoming_call(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<IncomingCallParams>,
) -> impl IntoResponse {
    let host = resolve_host(&state, &headers);
    let ws_url = format!("wss://{host}/voice/media-stream");
    let action_url = format!("https://{host}/voice/stream-ended");
    let caller = params.from.unwrap_or_default();

    tracing::info!(
        caller = %caller,
        callee = params.to.as_deref().unwrap_or("-"),
        call_sid = params.call_sid.as_deref().unwrap_or("-"),
        stream_url = %ws_url,
        "incoming call"
    );

    (
        [(header::CONTENT_TYPE, "text/xml")],
        twiml::connect_stream(&ws_url, &action_url, &caller),
    )
}

/// `POST /voice/stream-ended` — invoked by the provider once the media
/// stream is over. Teardown already ran when the stream socket closed;
/// this is the coordination hook for call-level follow-up.
pub async fn stream_ended(
    Form(params): Form<StreamEndedParams>,
) -> impl IntoResponse {
    tracing::info!(
        call_sid = params.call_sid.as_deref().unwrap_or("-"),
        call_status = params.call_status.as_deref().unwrap_or("-"),
        "media stream ended"
    );
    ([(header::CONTENT_TYPE, "text/xml")], twiml::empty())
}

/// `GET|POST /voice/transfer` — hands the call to a human agent. The
/// escalation workflow redirects the live call here; the response dials
/// the configured forward number.
pub async fn transfer(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let number = &state.config.escalation.forward_number;
    if number.is_empty() {
        tracing::warn!("transfer requested but no escalation forward number is configured");
        return ([(header::CONTENT_TYPE, "text/xml")], twiml::empty());
    }
    tracing::info!(forward_number = %number, "transferring call to human agent");
    ([(header::CONTENT_TYPE, "text/xml")], twiml::transfer(number))
}
