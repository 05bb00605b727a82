//! Twilio integration
//!
//! REST access to the provider's call resources, access-token signing and
//! TwiML writing. The [`CallProvider`] trait is the seam the call monitor
//! and the status endpoint depend on.

pub mod access_token;
pub mod client;
pub mod twiml;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::CallSnapshot;

pub use access_token::{AccessTokenBuilder, AccessTokenClaims, VoiceGrant};
pub use client::TwilioRestClient;
pub use twiml::VoiceResponse;

/// Errors returned by provider REST operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Twilio API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

/// Read access to the provider's call resources
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// List the most recent calls placed to `to`, newest first, at most `limit` entries.
    async fn list_calls(&self, to: &str, limit: u32) -> Result<Vec<CallSnapshot>, ProviderError>;

    /// Fetch the current state of a single call.
    async fn fetch_call(&self, call_sid: &str) -> Result<CallSnapshot, ProviderError>;
}
