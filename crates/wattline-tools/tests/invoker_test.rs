use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use wattline_tools::{ActionConfig, ToolCall, ToolInvoker};
use wattline_types::SessionIdentity;

fn identity() -> SessionIdentity {
    SessionIdentity {
        session_id: "tel-+33600000000".to_string(),
        call_id: Some("CA123".to_string()),
        stream_id: Some("MZ456".to_string()),
        caller: Some("+33600000000".to_string()),
    }
}

/// Starts a stub workflow host on an ephemeral port and returns its base URL.
async fn start_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn unknown_tool_short_circuits_without_network() {
    // Unroutable base URL: if the invoker attempted a request, it would fail
    // with a connect error rather than the unknown-tool message.
    let invoker = ToolInvoker::new(ActionConfig::new("http://192.0.2.1:1", None));

    let outcome = invoker.invoke("foo_bar", &json!({}), &identity()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Unknown tool: foo_bar"));
}

#[tokio::test]
async fn local_guide_tool_resolves_without_network() {
    let invoker = ToolInvoker::new(ActionConfig::new("http://192.0.2.1:1", None));

    let outcome = invoker
        .invoke(
            "app_guide",
            &json!({ "topic": "je veux arrêter ma session" }),
            &identity(),
        )
        .await;

    assert!(outcome.success);
    let data = outcome.data.expect("guide payload");
    assert_eq!(data["topic"], json!("stop_charging"));
    assert!(data["info"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn server_error_resolves_to_failure_envelope() {
    let router = Router::new().route(
        "/station-verification",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "workflow exploded") }),
    );
    let base = start_stub(router).await;
    let invoker = ToolInvoker::new(ActionConfig::new(base, None));

    let outcome = invoker
        .invoke(
            "station_verification",
            &json!({ "station_name": "Carrefour Montreuil" }),
            &identity(),
        )
        .await;

    assert!(!outcome.success);
    let error = outcome.error.expect("failure message");
    assert!(error.contains("500"), "expected status in message: {error}");
}

#[tokio::test]
async fn successful_call_carries_arguments_and_context() {
    let router = Router::new().route(
        "/user-management",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["name"], json!("Jean Dupont"));
            assert_eq!(body["_context"]["callSid"], json!("CA123"));
            assert_eq!(body["_context"]["streamSid"], json!("MZ456"));
            Json(json!({ "user_id": "u-42", "status": "found" }))
        }),
    );
    let base = start_stub(router).await;
    let invoker = ToolInvoker::new(ActionConfig::new(base, None));

    let outcome = invoker
        .invoke("user_management", &json!({ "name": "Jean Dupont" }), &identity())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.data.expect("data")["user_id"], json!("u-42"));
}

#[tokio::test]
async fn single_element_array_responses_unwrap() {
    let router = Router::new().route(
        "/check-cdrs",
        post(|| async { Json(json!([{ "sessions": 3 }])) }),
    );
    let base = start_stub(router).await;
    let invoker = ToolInvoker::new(ActionConfig::new(base, None));

    let outcome = invoker
        .invoke("check_cdrs", &json!({ "user_id": "u-42" }), &identity())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.data.expect("data"), json!({ "sessions": 3 }));
}

#[tokio::test]
async fn batch_invocation_keys_results_by_invocation_id() {
    let router = Router::new()
        .route(
            "/verify-rfid",
            post(|| async { Json(json!({ "active": true })) }),
        )
        .route(
            "/check-invoice",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
    let base = start_stub(router).await;
    let invoker = ToolInvoker::new(ActionConfig::new(base, None));

    let calls = vec![
        ToolCall {
            name: "verify_rfid".to_string(),
            invocation_id: "call-1".to_string(),
            arguments: json!({ "rfid_number": "AB12CD" }),
        },
        ToolCall {
            name: "check_invoice".to_string(),
            invocation_id: "call-2".to_string(),
            arguments: json!({ "user_id": "u-42" }),
        },
        ToolCall {
            name: "nope".to_string(),
            invocation_id: "call-3".to_string(),
            arguments: json!({}),
        },
    ];

    let results = invoker.invoke_batch(&calls, &identity()).await;

    assert_eq!(results.len(), 3);
    assert!(results["call-1"].success);
    assert!(!results["call-2"].success);
    assert!(results["call-2"].error.as_deref().unwrap().contains("502"));
    assert_eq!(results["call-3"].error.as_deref(), Some("Unknown tool: nope"));
}
