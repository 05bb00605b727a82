//! # Relay Events
//!
//! Normalized status events delivered to the relay target. Every event is a
//! typed merge of a fixed-shape event body ([`EventKind`]) and the connection
//! context fields when the identity could be resolved.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::call::{CallSnapshot, CallStatus};
use crate::models::context::{ConnectionContext, ContextFields};

/// Event-specific fields, tagged by the `event` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// A monitor located the provider call and started polling.
    CallInitiated { call_sid: String, status: CallStatus },
    /// One monitor poll of the provider's call resource.
    CallStatusUpdate {
        call_sid: String,
        status: CallStatus,
        duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        price_unit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        answered_by: Option<String>,
        poll_count: u32,
    },
    /// The monitor observed a terminal status.
    CallCompleted {
        call_sid: String,
        final_status: CallStatus,
        total_duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        price_unit: Option<String>,
    },
    /// A real-time call progress callback from the provider.
    WebhookEvent {
        event_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_sid: Option<String>,
        /// Raw provider status, forwarded as received
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
        duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_timestamp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_sid: Option<String>,
    },
    /// The outcome of the bridged leg, reported by the dial action callback.
    DialResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dial_call_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dial_call_status: Option<String>,
        dial_call_duration: u64,
    },
    /// A recording status callback.
    RecordingStatus {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_status: Option<String>,
        recording_duration: u64,
    },
}

impl EventKind {
    /// The `event` tag value, used for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CallInitiated { .. } => "call_initiated",
            EventKind::CallStatusUpdate { .. } => "call_status_update",
            EventKind::CallCompleted { .. } => "call_completed",
            EventKind::WebhookEvent { .. } => "webhook_event",
            EventKind::DialResult { .. } => "dial_result",
            EventKind::RecordingStatus { .. } => "recording_status",
        }
    }

    /// Poll updates are high-volume; their delivery failures are not logged.
    pub fn is_routine(&self) -> bool {
        matches!(self, EventKind::CallStatusUpdate { .. })
    }

    /// Provider call sid the event refers to, if any.
    pub fn call_sid(&self) -> Option<&str> {
        match self {
            EventKind::CallInitiated { call_sid, .. }
            | EventKind::CallStatusUpdate { call_sid, .. }
            | EventKind::CallCompleted { call_sid, .. } => Some(call_sid),
            EventKind::WebhookEvent { call_sid, .. }
            | EventKind::DialResult { call_sid, .. }
            | EventKind::RecordingStatus { call_sid, .. } => call_sid.as_deref(),
        }
    }

    pub fn status_update(snapshot: &CallSnapshot, poll_count: u32) -> Self {
        EventKind::CallStatusUpdate {
            call_sid: snapshot.sid.clone(),
            status: snapshot.status,
            duration: snapshot.duration_seconds(),
            start_time: snapshot.start_time.clone(),
            end_time: snapshot.end_time.clone(),
            price: snapshot.price.clone(),
            price_unit: snapshot.price_unit.clone(),
            direction: snapshot.direction.clone(),
            answered_by: snapshot.answered_by.clone(),
            poll_count,
        }
    }

    pub fn completed(snapshot: &CallSnapshot) -> Self {
        EventKind::CallCompleted {
            call_sid: snapshot.sid.clone(),
            final_status: snapshot.status,
            total_duration: snapshot.duration_seconds(),
            end_time: snapshot.end_time.clone(),
            price: snapshot.price.clone(),
            price_unit: snapshot.price_unit.clone(),
        }
    }
}

/// An event plus the identity and context it was correlated with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(flatten)]
    pub context: Option<ContextFields>,
}

impl StatusEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            identity: None,
            kind,
            context: None,
        }
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    /// Merge context fields when a context is available.
    pub fn with_context(mut self, context: Option<&ConnectionContext>) -> Self {
        self.context = context.map(ContextFields::from);
        self
    }
}

/// The JSON body posted to the relay target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub timestamp: DateTime<Utc>,
    pub account_sid: String,
    #[serde(flatten)]
    pub event: StatusEvent,
}

impl RelayPayload {
    pub fn new(account_sid: String, event: StatusEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            account_sid,
            event,
        }
    }
}
