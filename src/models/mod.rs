//! # Data Models
//!
//! This module contains the data models shared by the dialer service:
//! caller context, provider call views, callback forms and relay events.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod call;
pub mod context;
pub mod event;
pub mod webhook;

pub use call::{CallSnapshot, CallStatus};
pub use context::{ConnectionContext, ContextFields, LeadDetails};
pub use event::{EventKind, RelayPayload, StatusEvent};
pub use webhook::{CallEventForm, DialResultForm, IdentityQuery, RecordingStatusForm};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "dialer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
