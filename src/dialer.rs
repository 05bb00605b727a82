//! # Dialer Service
//!
//! Owns all runtime state of the service: the connection context store, the
//! call monitors, the notification relay and the provider client. It is built
//! once at startup, shared through the HTTP router state and torn down with
//! [`Dialer::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::call_document::CallDocumentGenerator;
use crate::config::{AppConfig, ConfigError};
use crate::context::ConnectionContextStore;
use crate::models::{
    CallEventForm, CallSnapshot, DialResultForm, EventKind, RecordingStatusForm, StatusEvent,
};
use crate::monitor::MonitorManager;
use crate::relay::{HttpRelayTransport, NotificationRelay, RelayError, RelayTransport};
use crate::token_issuer::{IssuedToken, TokenError, TokenIssuer, TokenRequest};
use crate::twilio::{AccessTokenBuilder, CallProvider, ProviderError, TwilioRestClient};

#[derive(Debug, Error)]
pub enum DialerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build provider client: {0}")]
    Provider(#[from] ProviderError),

    #[error("failed to build relay transport: {0}")]
    Relay(#[from] RelayError),
}

pub struct Dialer {
    contexts: ConnectionContextStore,
    tokens: TokenIssuer,
    documents: CallDocumentGenerator,
    monitors: MonitorManager,
    relay: NotificationRelay,
    provider: Arc<dyn CallProvider>,
}

impl Dialer {
    /// Build the service with the Twilio REST client and, when configured, the HTTP relay.
    pub fn from_config(config: &AppConfig) -> Result<Self, DialerError> {
        let credentials = config.twilio_credentials()?;
        let provider = Arc::new(TwilioRestClient::new(
            &config.twilio_api_base,
            credentials.account_sid,
            credentials.auth_token,
        )?);

        let transport: Option<Arc<dyn RelayTransport>> = match config.relay_target()? {
            Some(url) => Some(Arc::new(HttpRelayTransport::new(
                url,
                config.relay_timeout(),
            )?)),
            None => None,
        };

        Self::with_parts(config, provider, transport)
    }

    /// Build the service around an explicit provider and relay transport.
    pub fn with_parts(
        config: &AppConfig,
        provider: Arc<dyn CallProvider>,
        transport: Option<Arc<dyn RelayTransport>>,
    ) -> Result<Self, DialerError> {
        let credentials = config.twilio_credentials()?;

        let contexts = ConnectionContextStore::new(config.context_ttl());
        let relay = NotificationRelay::new(transport, credentials.account_sid.clone());
        if !relay.is_enabled() {
            info!("No relay target configured; status events will not be forwarded");
        }

        let builder = AccessTokenBuilder::new(
            credentials.account_sid.clone(),
            credentials.api_key,
            &credentials.api_secret,
            Duration::from_secs(config.token_ttl_seconds),
        )
        .with_application_sid(config.twilio_app_sid.clone());
        let tokens = TokenIssuer::new(builder, credentials.account_sid, contexts.clone());

        if config.twilio_phone_number.is_none() {
            warn!("No caller id configured; bridged calls will not set callerId");
        }
        let documents = CallDocumentGenerator::new(
            config.server_base_url()?,
            config.twilio_phone_number.clone(),
            contexts.clone(),
            relay.is_enabled(),
        );

        let monitors = MonitorManager::new(provider.clone(), relay.clone(), config.monitor.clone());

        Ok(Self {
            contexts,
            tokens,
            documents,
            monitors,
            relay,
            provider,
        })
    }

    pub fn contexts(&self) -> &ConnectionContextStore {
        &self.contexts
    }

    pub fn monitors(&self) -> &MonitorManager {
        &self.monitors
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    pub async fn issue_token(&self, request: TokenRequest) -> Result<IssuedToken, TokenError> {
        self.tokens.issue(request).await
    }

    /// Call document for a client-originated call. Never fails: internal
    /// errors degrade to the minimal error document.
    ///
    /// When the caller's context is live and a relay target is configured,
    /// monitoring of the placed call is scheduled on a background task.
    #[instrument(skip(self))]
    pub async fn voice_document(&self, to: Option<&str>, from: Option<&str>) -> String {
        match self.documents.voice(to, from).await {
            Ok(document) => {
                if let Some(request) = document.monitor {
                    self.monitors.schedule(request);
                }
                document.xml
            }
            Err(err) => {
                error!(error = %err, "Failed to build call document");
                CallDocumentGenerator::error_document()
            }
        }
    }

    pub fn connect_document(&self, identity: Option<&str>) -> String {
        info!(identity = identity.unwrap_or(""), "Connect request");
        self.documents.connect().unwrap_or_else(|err| {
            error!(error = %err, "Failed to build connect document");
            CallDocumentGenerator::error_document()
        })
    }

    /// Relay the outcome of the bridged leg.
    #[instrument(skip_all)]
    pub async fn ingest_dial_result(&self, identity: Option<String>, form: DialResultForm) {
        info!(
            call_sid = form.call_sid.as_deref().unwrap_or(""),
            dial_call_status = form.dial_call_status.as_deref().unwrap_or(""),
            dial_call_duration = form.dial_call_duration.as_deref().unwrap_or("0"),
            "Dial result"
        );
        self.emit(form.into_event(), identity).await;
    }

    /// Relay a call progress event and stop the call's monitor once the call has ended.
    #[instrument(skip_all)]
    pub async fn ingest_call_event(&self, identity: Option<String>, form: CallEventForm) {
        let status = form.status();
        info!(
            call_sid = form.call_sid.as_deref().unwrap_or(""),
            direction = form.direction.as_deref().unwrap_or(""),
            status = form.call_status.as_deref().unwrap_or(""),
            "Call event"
        );

        if let (Some(status), Some(call_sid)) = (status, form.call_sid.as_deref()) {
            if status.is_terminal() && self.monitors.terminate(call_sid).await {
                info!(call_sid = %call_sid, status = %status, "Stopped monitoring; call ended via webhook");
            }
        }

        self.emit(form.into_event(), identity).await;
    }

    #[instrument(skip_all)]
    pub async fn ingest_recording_status(&self, identity: Option<String>, form: RecordingStatusForm) {
        if form.is_completed() {
            info!(
                recording_sid = form.recording_sid.as_deref().unwrap_or(""),
                recording_url = form.recording_url.as_deref().unwrap_or(""),
                duration = form.recording_duration.as_deref().unwrap_or("0"),
                "Recording completed"
            );
        }
        self.emit(form.into_event(), identity).await;
    }

    /// Current provider view of a call.
    pub async fn fetch_call_status(&self, call_sid: &str) -> Result<CallSnapshot, ProviderError> {
        self.provider.fetch_call(call_sid).await
    }

    /// Cancel every live monitor.
    pub async fn shutdown(&self) {
        self.monitors.shutdown().await;
    }

    async fn emit(&self, kind: EventKind, identity: Option<String>) {
        if !self.relay.is_enabled() {
            return;
        }

        let context = match identity.as_deref() {
            Some(identity) => self.contexts.get(identity).await,
            None => None,
        };
        let event = StatusEvent::new(kind)
            .with_identity(identity)
            .with_context(context.as_ref());
        self.relay.emit(event).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn config() -> AppConfig {
        AppConfig {
            twilio_account_sid: Some("AC123".to_string()),
            twilio_api_key: Some("SK456".to_string()),
            twilio_api_secret: Some("secret".to_string()),
            twilio_auth_token: Some("auth".to_string()),
            twilio_phone_number: Some("+14155550100".to_string()),
            twilio_app_sid: Some("AP789".to_string()),
            server_url: "https://dialer.example.com".to_string(),
            ..AppConfig::default()
        }
    }
}
