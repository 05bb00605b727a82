//! # Provider Callback Forms
//!
//! Form-encoded bodies the provider POSTs to the webhook routes, and their
//! mapping onto relay events. Every field is optional; numeric fields arrive
//! as strings and default to zero when absent or unparsable.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::models::call::CallStatus;
use crate::models::event::EventKind;

/// `identity` query parameter carried by callback URLs.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdentityQuery {
    /// Client identity the callback was issued for
    pub identity: Option<String>,
}

impl IdentityQuery {
    pub fn into_identity(self) -> Option<String> {
        self.identity
            .map(|identity| identity.trim().to_string())
            .filter(|identity| !identity.is_empty())
    }
}

/// Post-bridge result reported to the dial `action` URL.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct DialResultForm {
    pub call_sid: Option<String>,
    pub dial_call_sid: Option<String>,
    pub dial_call_status: Option<String>,
    pub dial_call_duration: Option<String>,
}

impl DialResultForm {
    pub fn into_event(self) -> EventKind {
        EventKind::DialResult {
            call_sid: self.call_sid,
            dial_call_sid: self.dial_call_sid,
            dial_call_status: self.dial_call_status,
            dial_call_duration: parse_seconds(self.dial_call_duration.as_deref()),
        }
    }
}

/// Call progress callback (`initiated`, `ringing`, `answered`, `completed`).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct CallEventForm {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub to: Option<String>,
    pub from: Option<String>,
    pub direction: Option<String>,
    pub duration: Option<String>,
    pub call_duration: Option<String>,
    pub timestamp: Option<String>,
    pub recording_url: Option<String>,
    pub recording_sid: Option<String>,
}

impl CallEventForm {
    /// Parsed status, used to decide whether the call has ended.
    pub fn status(&self) -> Option<CallStatus> {
        self.call_status.as_deref().map(CallStatus::parse)
    }

    pub fn into_event(self) -> EventKind {
        let duration = [self.duration.as_deref(), self.call_duration.as_deref()]
            .into_iter()
            .map(parse_seconds)
            .find(|seconds| *seconds > 0)
            .unwrap_or(0);

        EventKind::WebhookEvent {
            event_type: self.call_status.clone().unwrap_or_default(),
            call_sid: self.call_sid,
            status: self.call_status,
            to: self.to,
            from: self.from,
            direction: self.direction,
            duration,
            call_timestamp: self.timestamp,
            recording_url: self.recording_url,
            recording_sid: self.recording_sid,
        }
    }
}

/// Recording status callback.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingStatusForm {
    pub call_sid: Option<String>,
    pub recording_sid: Option<String>,
    pub recording_url: Option<String>,
    pub recording_status: Option<String>,
    pub recording_duration: Option<String>,
}

impl RecordingStatusForm {
    pub fn is_completed(&self) -> bool {
        self.recording_status.as_deref() == Some("completed") && self.recording_url.is_some()
    }

    pub fn into_event(self) -> EventKind {
        EventKind::RecordingStatus {
            call_sid: self.call_sid,
            recording_sid: self.recording_sid,
            recording_url: self.recording_url,
            recording_status: self.recording_status,
            recording_duration: parse_seconds(self.recording_duration.as_deref()),
        }
    }
}

fn parse_seconds(value: Option<&str>) -> u64 {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}
