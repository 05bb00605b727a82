//! # Call Document Generator
//!
//! Produces the TwiML returned to the provider when a client places a call.
//! The document bridges the client to the normalized target number and wires
//! every progress callback back to this service, tagged with the caller's
//! identity so events can be correlated with the stored context.

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::context::ConnectionContextStore;
use crate::models::ConnectionContext;
use crate::phone::normalize_phone_number;
use crate::twilio::twiml::{Dial, Number, Say, TwimlError, VoiceResponse};

const VOICE: &str = "alice";
const LANGUAGE: &str = "en-IN";
const CLIENT_PREFIX: &str = "client:";
const DIAL_TIMEOUT_SECONDS: u32 = 60;
const STATUS_CALLBACK_EVENTS: &str = "initiated ringing answered completed";

const MISSING_NUMBER_PROMPT: &str = "Please provide a phone number to call.";
const ERROR_PROMPT: &str = "An error occurred. Please try again.";
const FALLBACK_ERROR_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say>An error occurred. Please try again.</Say></Response>"#;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Twiml(#[from] TwimlError),

    #[error("failed to build callback URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Monitoring to start once the document has been served.
#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub phone_number: String,
    pub identity: String,
    pub context: ConnectionContext,
}

/// A generated call document.
#[derive(Debug, Clone)]
pub struct CallDocument {
    pub xml: String,
    /// Set when a relay target is configured and the caller's context is live
    pub monitor: Option<MonitorRequest>,
}

#[derive(Clone)]
pub struct CallDocumentGenerator {
    base_url: Url,
    caller_id: Option<String>,
    contexts: ConnectionContextStore,
    relay_enabled: bool,
}

impl CallDocumentGenerator {
    pub fn new(
        mut base_url: Url,
        caller_id: Option<String>,
        contexts: ConnectionContextStore,
        relay_enabled: bool,
    ) -> Self {
        // Callback paths are joined relative to the base, which needs a trailing slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            base_url,
            caller_id,
            contexts,
            relay_enabled,
        }
    }

    /// Build the document for an outbound call from `caller` to `to`.
    pub async fn voice(
        &self,
        to: Option<&str>,
        caller: Option<&str>,
    ) -> Result<CallDocument, DocumentError> {
        let Some(to) = to.map(str::trim).filter(|value| !value.is_empty()) else {
            warn!("Voice request without a target number");
            let xml = VoiceResponse::new()
                .say(Say::new(MISSING_NUMBER_PROMPT))
                .to_xml()?;
            return Ok(CallDocument { xml, monitor: None });
        };

        let target = normalize_phone_number(to);
        let identity = caller.and_then(resolve_identity);
        let context = match &identity {
            Some(identity) => self.contexts.get(identity).await,
            None => None,
        };

        info!(
            identity = identity.as_deref().unwrap_or(""),
            to = %target,
            has_context = context.is_some(),
            "Client calling number"
        );

        let number = Number::new(target.clone())
            .attr("statusCallbackEvent", STATUS_CALLBACK_EVENTS)
            .attr(
                "statusCallback",
                self.callback_url("call-events", identity.as_deref())?,
            )
            .attr("statusCallbackMethod", "POST");

        let mut dial = Dial::new(number);
        if let Some(caller_id) = &self.caller_id {
            dial = dial.attr("callerId", caller_id.clone());
        }
        let dial = dial
            .attr("timeout", DIAL_TIMEOUT_SECONDS.to_string())
            .attr("answerOnBridge", "true")
            .attr("ringTone", "in")
            .attr(
                "action",
                self.callback_url("call-status", identity.as_deref())?,
            )
            .attr("method", "POST")
            .attr("record", "record-from-answer")
            .attr(
                "recordingStatusCallback",
                self.callback_url("recording-status", None)?,
            )
            .attr("recordingStatusCallbackMethod", "POST");

        let xml = VoiceResponse::new()
            .say(
                Say::new("Connecting your call, please wait.")
                    .voice(VOICE)
                    .language(LANGUAGE),
            )
            .dial(dial)
            .to_xml()?;

        let monitor = match (identity, context) {
            (Some(identity), Some(context)) if self.relay_enabled => Some(MonitorRequest {
                phone_number: target,
                identity,
                context,
            }),
            _ => None,
        };

        Ok(CallDocument { xml, monitor })
    }

    /// Acknowledgment document for the connect endpoint.
    pub fn connect(&self) -> Result<String, DocumentError> {
        Ok(VoiceResponse::new()
            .say(Say::new("Connecting your call.").voice(VOICE).language(LANGUAGE))
            .to_xml()?)
    }

    /// Minimal document served when anything else fails.
    pub fn error_document() -> String {
        VoiceResponse::new()
            .say(Say::new(ERROR_PROMPT))
            .to_xml()
            .unwrap_or_else(|_| FALLBACK_ERROR_DOCUMENT.to_string())
    }

    fn callback_url(&self, path: &str, identity: Option<&str>) -> Result<String, DocumentError> {
        let mut url = self.base_url.join(path)?;
        if let Some(identity) = identity {
            url.query_pairs_mut().append_pair("identity", identity);
        }
        Ok(url.to_string())
    }
}

/// Client identity from the provider's `From` value, which carries a `client:` prefix
/// for SDK-originated calls.
pub fn resolve_identity(caller: &str) -> Option<String> {
    let caller = caller.trim();
    let identity = caller.strip_prefix(CLIENT_PREFIX).unwrap_or(caller);
    (!identity.is_empty()).then(|| identity.to_string())
}
