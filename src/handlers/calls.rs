//! # Call Status Handler

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{CallSnapshot, CallStatus};
use crate::monitor::MonitorSnapshot;
use crate::server::AppState;

/// Current provider view of a call
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusResponse {
    pub call_sid: String,
    pub status: CallStatus,
    /// Duration in seconds, absent until the call ends
    pub duration: Option<u64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub price: Option<String>,
    pub price_unit: Option<String>,
    pub direction: Option<String>,
    pub answered_by: Option<String>,
    /// Live monitor for this call, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSnapshot>,
}

impl CallStatusResponse {
    fn new(snapshot: CallSnapshot, monitor: Option<MonitorSnapshot>) -> Self {
        Self {
            call_sid: snapshot.sid,
            status: snapshot.status,
            duration: snapshot.duration,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            from: snapshot.from,
            to: snapshot.to,
            price: snapshot.price,
            price_unit: snapshot.price_unit,
            direction: snapshot.direction,
            answered_by: snapshot.answered_by,
            monitor,
        }
    }
}

/// Fetch the current status of a call from the provider
#[utoipa::path(
    get,
    path = "/call-status/{call_sid}",
    params(
        ("call_sid" = String, Path, description = "Provider call sid")
    ),
    responses(
        (status = 200, description = "Current call status", body = CallStatusResponse),
        (status = 502, description = "Provider returned an error", body = ApiError),
        (status = 500, description = "Provider unreachable", body = ApiError)
    ),
    tag = "calls"
)]
pub async fn get_call_status(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallStatusResponse>, ApiError> {
    info!(call_sid = %call_sid, "Fetching call status");

    let snapshot = state.dialer.fetch_call_status(&call_sid).await?;
    let monitor = state.dialer.monitors().snapshot(&call_sid).await;

    Ok(Json(CallStatusResponse::new(snapshot, monitor)))
}
