//! # Tests for Handlers
//!
//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
    response::Json,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::dialer::{Dialer, testing::config};
use crate::handlers::root;
use crate::models::CallStatus;
use crate::monitor::testing::{ScriptedProvider, snapshot};
use crate::relay::RelayTransport;
use crate::relay::testing::RecordingTransport;
use crate::server::{AppState, create_app};

const FORM: &str = "application/x-www-form-urlencoded";

fn app_with(provider: ScriptedProvider) -> (Router, Arc<Dialer>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let relay: Option<Arc<dyn RelayTransport>> = Some(transport.clone());
    let dialer = Arc::new(Dialer::with_parts(&config(), Arc::new(provider), relay).unwrap());
    let state = AppState {
        config: Arc::new(config()),
        dialer: dialer.clone(),
    };
    (create_app(state), dialer, transport)
}

fn app() -> (Router, Arc<Dialer>, Arc<RecordingTransport>) {
    app_with(ScriptedProvider::default())
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, FORM)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Wait for spawned webhook processing to reach the relay.
async fn wait_for_events(transport: &RecordingTransport, count: usize) {
    for _ in 0..100 {
        if transport.delivered.lock().await.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} relayed events");
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "dialer");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_liveness_route() {
    let (app, _, _) = app();
    let response = app.oneshot(get("/test")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_string(response).await, "Server is working");
}

#[tokio::test]
async fn test_token_requires_phone_number() {
    let (app, dialer, _) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/token?leadName=Asha")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["message"], "Phone number is required");
    assert_eq!(body["trace_id"], "req-42");
    assert!(dialer.contexts().is_empty().await);
}

#[tokio::test]
async fn test_token_issues_credential_and_stores_context() {
    let (app, dialer, _) = app();
    let response = app
        .oneshot(get(
            "/token?phoneNumber=9876543210&leadName=Asha&company=Acme&userId=u-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["phoneNumber"], "+919876543210");
    assert_eq!(body["accountSid"], "AC123");
    assert!(body["token"].as_str().unwrap().contains('.'));

    let identity = body["identity"].as_str().unwrap();
    let context = dialer.contexts().get(identity).await.unwrap();
    assert_eq!(context.lead.lead_name, "Asha");
    assert_eq!(context.lead.company, "Acme");
    assert_eq!(context.lead.user_id, "u-1");
}

#[tokio::test]
async fn test_voice_returns_twiml_bridge() {
    let (app, _, _) = app();
    let response = app
        .oneshot(form_post("/voice", "To=9876543210&From=client%3Auser_1_2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/xml");
    let xml = body_string(response).await;
    assert!(xml.contains(r#"callerId="+14155550100""#));
    assert!(xml.contains(">+919876543210</Number>"));
    assert!(xml.contains("call-events?identity=user_1_2"));
}

#[tokio::test]
async fn test_voice_without_target_speaks_error_prompt() {
    let (app, _, _) = app();
    let response = app
        .oneshot(form_post("/voice", "From=client%3Auser_1_2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_string(response).await;
    assert!(xml.contains("Please provide a phone number to call."));
    assert!(!xml.contains("<Dial"));
}

#[tokio::test]
async fn test_voice_with_unreadable_body_still_returns_document() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/voice")
                .body(Body::from("To=1"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/xml");
    assert!(body_string(response).await.contains("<Response>"));
}

#[tokio::test]
async fn test_connect_speaks_acknowledgment() {
    let (app, _, _) = app();
    let response = app
        .oneshot(get("/twiml/connect?identity=user_1_2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_string(response).await;
    assert!(xml.contains(r#"<Say voice="alice" language="en-IN">Connecting your call.</Say>"#));
}

#[tokio::test]
async fn test_call_events_acknowledge_and_relay() {
    let (app, dialer, transport) = app();
    let issued = dialer
        .issue_token(crate::token_issuer::TokenRequest {
            phone_number: Some("9876543210".to_string()),
            lead_id: Some("L-9".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let uri = format!("/call-events?identity={}", issued.identity);
    let response = app
        .oneshot(form_post(
            &uri,
            "CallSid=CA1&CallStatus=ringing&Direction=outbound-dial&To=%2B919876543210&Timestamp=Tue%2C+31+Aug+2010",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    wait_for_events(&transport, 1).await;
    let delivered = transport.delivered.lock().await;
    let event = &delivered[0];
    assert_eq!(event["event"], "webhook_event");
    assert_eq!(event["eventType"], "ringing");
    assert_eq!(event["status"], "ringing");
    assert_eq!(event["to"], "+919876543210");
    assert_eq!(event["callTimestamp"], "Tue, 31 Aug 2010");
    assert_eq!(event["leadId"], "L-9");
    assert_eq!(event["identity"], issued.identity.as_str());
}

#[tokio::test]
async fn test_dial_result_and_recording_status_acknowledge() {
    let (app, _, transport) = app();

    let response = app
        .clone()
        .oneshot(form_post(
            "/call-status?identity=user_x",
            "CallSid=CA1&DialCallSid=CA2&DialCallStatus=answered&DialCallDuration=14",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    let response = app
        .oneshot(form_post(
            "/recording-status",
            "CallSid=CA1&RecordingSid=RE1&RecordingStatus=completed&RecordingUrl=https%3A%2F%2Fapi.twilio.com%2FRE1&RecordingDuration=14",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    wait_for_events(&transport, 2).await;
    let mut events = transport.events().await;
    events.sort();
    assert_eq!(events, vec!["dial_result", "recording_status"]);

    let delivered = transport.delivered.lock().await;
    let dial = delivered
        .iter()
        .find(|payload| payload["event"] == "dial_result")
        .unwrap();
    assert_eq!(dial["dialCallStatus"], "answered");
    assert_eq!(dial["dialCallDuration"], 14);
}

#[tokio::test]
async fn test_call_status_returns_provider_view() {
    let provider = ScriptedProvider::new(vec![], vec![Some(CallStatus::Completed)]);
    let (app, _, _) = app_with(provider);

    let response = app.oneshot(get("/call-status/CA77")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["callSid"], "CA77");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["duration"], 42);
    assert_eq!(body["direction"], "outbound-dial");
    assert!(body.get("monitor").is_none());
}

#[tokio::test]
async fn test_call_status_maps_provider_failure() {
    let provider = ScriptedProvider::new(vec![snapshot("CA1", CallStatus::Ringing)], vec![None]);
    let (app, _, _) = app_with(provider);

    let response = app.oneshot(get("/call-status/CA1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "PROVIDER_ERROR");
    assert_eq!(body["details"]["status"], 503);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _, _) = app();
    let response = app.oneshot(get("/openapi.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"].get("/token").is_some());
    assert!(body["paths"].get("/call-status/{call_sid}").is_some());
}
