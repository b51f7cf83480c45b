use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wattline_transcript::{
    HelpdeskClient, HelpdeskConfig, Summarizer, SummaryConfig, TranscriptRecorder,
};
use wattline_types::SessionIdentity;

/// Records which helpdesk endpoints were hit, in order.
type HitLog = Arc<Mutex<Vec<String>>>;

fn hit(log: &HitLog, name: &str) {
    log.lock().expect("hit log lock").push(name.to_string());
}

async fn start_helpdesk(router: Router<HitLog>, hits: HitLog) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    let app = router.with_state(hits);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    format!("http://{addr}")
}

fn happy_path_router() -> Router<HitLog> {
    Router::new()
        .route(
            "/api/v1/accounts/1/contacts",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "contact");
                Json(json!({ "payload": { "contact": { "id": 7 } } }))
            }),
        )
        .route(
            "/api/v1/accounts/1/conversations",
            post(|State(hits): State<HitLog>, Json(body): Json<Value>| async move {
                hit(&hits, "conversation");
                assert_eq!(body["source_id"], json!("tel-+33600000000"));
                Json(json!({ "id": 99 }))
            }),
        )
        .route(
            "/api/v1/accounts/1/conversations/99/messages",
            post(|State(hits): State<HitLog>, Json(body): Json<Value>| async move {
                hit(&hits, "message");
                assert!(body["content"].as_str().is_some());
                Json(json!({ "id": 1 }))
            }),
        )
        .route(
            "/api/v1/accounts/1/conversations/99/toggle_priority",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "priority");
                Json(json!({}))
            }),
        )
        .route(
            "/api/v1/accounts/1/conversations/99/custom_attributes",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "summary");
                Json(json!({}))
            }),
        )
}

fn config_for(base: &str) -> HelpdeskConfig {
    HelpdeskConfig {
        url: base.to_string(),
        account_id: "1".to_string(),
        inbox_id: "2".to_string(),
        api_token: "token".to_string(),
    }
}

fn identity() -> SessionIdentity {
    SessionIdentity {
        session_id: "tel-+33600000000".to_string(),
        call_id: Some("CA123".to_string()),
        stream_id: Some("MZ456".to_string()),
        caller: Some("+33600000000".to_string()),
    }
}

fn recorder_for(base: &str) -> TranscriptRecorder {
    TranscriptRecorder::new(
        identity(),
        HelpdeskClient::new(config_for(base)),
        Summarizer::new(SummaryConfig::default()),
        None,
    )
}

#[tokio::test]
async fn full_flush_pushes_transcript_and_summary() {
    let hits: HitLog = Arc::default();
    let base = start_helpdesk(happy_path_router(), hits.clone()).await;

    let mut rec = recorder_for(&base);
    rec.append_user("Bonjour").await;
    rec.append_assistant("Bonjour, comment puis-je vous aider?").await;

    let result = rec.close().await;

    assert!(result.success, "flush failed: {result:?}");
    assert_eq!(result.conversation_id, Some(99));
    assert_eq!(result.message_count, Some(2));

    let calls = hits.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec!["contact", "conversation", "message", "message", "summary"]
    );
}

#[tokio::test]
async fn escalated_flush_toggles_urgent_priority() {
    let hits: HitLog = Arc::default();
    let base = start_helpdesk(happy_path_router(), hits.clone()).await;

    let mut rec = recorder_for(&base);
    rec.append_user("Je veux parler à un humain").await;
    rec.mark_escalation_requested();

    let result = rec.close().await;

    assert!(result.success);
    let calls = hits.lock().unwrap().clone();
    assert!(calls.contains(&"priority".to_string()), "calls: {calls:?}");
}

#[tokio::test]
async fn empty_transcript_skips_every_external_call() {
    let hits: HitLog = Arc::default();
    let base = start_helpdesk(happy_path_router(), hits.clone()).await;

    let rec = recorder_for(&base);
    let result = rec.close().await;

    assert!(!result.success);
    assert_eq!(result.reason.as_deref(), Some("no_messages"));
    assert!(hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn contact_failure_aborts_before_conversation_creation() {
    let hits: HitLog = Arc::default();
    let router: Router<HitLog> = Router::new()
        .route(
            "/api/v1/accounts/1/contacts",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "contact");
                (StatusCode::INTERNAL_SERVER_ERROR, "boom")
            }),
        )
        .route(
            "/api/v1/accounts/1/conversations",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "conversation");
                Json(json!({ "id": 99 }))
            }),
        );
    let base = start_helpdesk(router, hits.clone()).await;

    let mut rec = recorder_for(&base);
    rec.append_user("Bonjour").await;

    let result = rec.close().await;

    assert!(!result.success);
    assert_eq!(result.reason.as_deref(), Some("contact_creation_failed"));
    assert_eq!(hits.lock().unwrap().clone(), vec!["contact"]);
}

#[tokio::test]
async fn existing_contact_is_found_via_search() {
    let hits: HitLog = Arc::default();
    let router = happy_path_router()
        // Shadow the contact route: creation is rejected as a duplicate.
        .route(
            "/api/v1/accounts/3/contacts",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "contact_422");
                (StatusCode::UNPROCESSABLE_ENTITY, "identifier taken")
            }),
        )
        .route(
            "/api/v1/accounts/3/contacts/search",
            get(|State(hits): State<HitLog>| async move {
                hit(&hits, "search");
                Json(json!({ "payload": [{ "id": 7 }] }))
            }),
        )
        .route(
            "/api/v1/accounts/3/contacts/7",
            axum::routing::put(|State(hits): State<HitLog>| async move {
                hit(&hits, "phone_update");
                Json(json!({}))
            }),
        )
        .route(
            "/api/v1/accounts/3/conversations",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "conversation");
                Json(json!({ "id": 99 }))
            }),
        )
        .route(
            "/api/v1/accounts/3/conversations/99/messages",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "message");
                Json(json!({ "id": 1 }))
            }),
        )
        .route(
            "/api/v1/accounts/3/conversations/99/custom_attributes",
            post(|State(hits): State<HitLog>| async move {
                hit(&hits, "summary");
                Json(json!({}))
            }),
        );
    let base = start_helpdesk(router, hits.clone()).await;

    let mut config = config_for(&base);
    config.account_id = "3".to_string();
    let mut rec = TranscriptRecorder::new(
        identity(),
        HelpdeskClient::new(config),
        Summarizer::new(SummaryConfig::default()),
        None,
    );
    rec.append_user("Bonjour").await;

    let result = rec.close().await;

    assert!(result.success, "flush failed: {result:?}");
    let calls = hits.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec!["contact_422", "search", "phone_update", "conversation", "message", "summary"]
    );
}
