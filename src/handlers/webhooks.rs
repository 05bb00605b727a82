//! # Webhook Handlers
//!
//! Provider callbacks for dial results, call progress and recordings. Each
//! callback is acknowledged with `200 OK` right away; mapping and relaying
//! happen on a background task after the response is produced.

use std::future::Future;

use axum::{
    Form,
    extract::{Query, State},
};

use crate::models::{CallEventForm, DialResultForm, IdentityQuery, RecordingStatusForm};
use crate::server::AppState;
use crate::telemetry::{self, TraceContext};

const ACK: &str = "OK";

/// Run `work` on its own task, keeping the request's trace id.
fn spawn_ingest<F>(work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match telemetry::current_trace_id() {
        Some(trace_id) => {
            tokio::spawn(telemetry::with_trace_context(TraceContext { trace_id }, work));
        }
        None => {
            tokio::spawn(work);
        }
    }
}

/// Post-bridge dial result
#[utoipa::path(
    post,
    path = "/call-status",
    params(IdentityQuery),
    request_body(content = DialResultForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Callback accepted", body = String, content_type = "text/plain")
    ),
    tag = "webhooks"
)]
pub async fn dial_result(
    State(state): State<AppState>,
    Query(query): Query<IdentityQuery>,
    Form(form): Form<DialResultForm>,
) -> &'static str {
    let identity = query.into_identity();
    let dialer = state.dialer.clone();
    spawn_ingest(async move { dialer.ingest_dial_result(identity, form).await });
    ACK
}

/// Real-time call progress event
#[utoipa::path(
    post,
    path = "/call-events",
    params(IdentityQuery),
    request_body(content = CallEventForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Callback accepted", body = String, content_type = "text/plain")
    ),
    tag = "webhooks"
)]
pub async fn call_events(
    State(state): State<AppState>,
    Query(query): Query<IdentityQuery>,
    Form(form): Form<CallEventForm>,
) -> &'static str {
    let identity = query.into_identity();
    let dialer = state.dialer.clone();
    spawn_ingest(async move { dialer.ingest_call_event(identity, form).await });
    ACK
}

/// Recording status callback
#[utoipa::path(
    post,
    path = "/recording-status",
    params(IdentityQuery),
    request_body(content = RecordingStatusForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Callback accepted", body = String, content_type = "text/plain")
    ),
    tag = "webhooks"
)]
pub async fn recording_status(
    State(state): State<AppState>,
    Query(query): Query<IdentityQuery>,
    Form(form): Form<RecordingStatusForm>,
) -> &'static str {
    let identity = query.into_identity();
    let dialer = state.dialer.clone();
    spawn_ingest(async move { dialer.ingest_recording_status(identity, form).await });
    ACK
}
