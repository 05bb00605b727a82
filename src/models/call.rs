//! # Call Models
//!
//! Provider call statuses and the provider's view of a single call.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl CallStatus {
    /// Statuses from which no further progress occurs.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Canceled
        )
    }

    /// Statuses a freshly placed call can be found in when searching for it.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CallStatus::InProgress | CallStatus::Ringing | CallStatus::Queued
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Canceled => "canceled",
            CallStatus::Unknown => "unknown",
        }
    }

    /// Parse a status string as reported in webhook form fields.
    pub fn parse(value: &str) -> Self {
        match value {
            "queued" => CallStatus::Queued,
            "ringing" => CallStatus::Ringing,
            "in-progress" => CallStatus::InProgress,
            "completed" => CallStatus::Completed,
            "busy" => CallStatus::Busy,
            "failed" => CallStatus::Failed,
            "no-answer" => CallStatus::NoAnswer,
            "canceled" => CallStatus::Canceled,
            _ => CallStatus::Unknown,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provider's current view of a call, as returned by the calls resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallSnapshot {
    pub sid: String,
    pub status: CallStatus,
    /// Call duration in seconds; the provider reports it as a string, null until the call ends
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub price_unit: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub answered_by: Option<String>,
}

impl CallSnapshot {
    /// Duration in seconds, zero while unknown.
    pub fn duration_seconds(&self) -> u64 {
        self.duration.unwrap_or(0)
    }
}

/// Accepts a number, a numeric string, or null.
fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(value)) => Some(value),
        Some(Raw::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}
