//! wattline server library logic.

pub mod client_stream;
pub mod config;
pub mod media_stream;
pub mod twiml;
pub mod voice;

use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use config::Config;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wattline_bridge::SessionServices;
use wattline_tools::ToolInvoker;
use wattline_transcript::{HelpdeskClient, Summarizer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Full server configuration.
    pub config: Arc<Config>,
    /// Per-session collaborators (tool invoker, helpdesk, summarizer).
    pub services: SessionServices,
}

/// Builds the shared state from loaded configuration.
pub fn build_state(config: Config) -> Arc<AppState> {
    let transcript_dir = if config.transcripts.dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(&config.transcripts.dir))
    };

    let services = SessionServices {
        invoker: ToolInvoker::new(config.actions.clone()),
        helpdesk: HelpdeskClient::new(config.helpdesk.clone()),
        summarizer: Summarizer::new(config.summary.clone()),
        transcript_dir,
    };

    Arc::new(AppState {
        config: Arc::new(config),
        services,
    })
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load
/// balancers, monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "wattline voice relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/voice/incoming",
            get(voice::incoming_call).post(voice::incoming_call),
        )
        .route("/voice/stream-ended", post(voice::stream_ended))
        .route("/voice/transfer", get(voice::transfer).post(voice::transfer))
        .route("/voice/media-stream", get(media_stream::media_stream_handler))
        .route("/client-stream", get(client_stream::client_stream_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
