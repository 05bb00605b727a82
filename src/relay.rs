//! # Notification Relay
//!
//! Best-effort delivery of status events to the external automation endpoint.
//! One attempt per event, bounded by a timeout; failures are logged and the
//! event is dropped. Callers never observe delivery errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{RelayPayload, StatusEvent};

const RELAY_USER_AGENT: &str = "Twilio-Call-System/2.0";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay target returned status {0}")]
    Status(u16),

    #[error("relay request timed out")]
    Timeout,

    #[error("relay transport error: {0}")]
    Transport(String),
}

/// Delivers a single payload to the relay target.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn deliver(&self, payload: &RelayPayload) -> Result<(), RelayError>;

    /// Redacted description of the target for logs.
    fn target(&self) -> String;
}

/// JSON-over-HTTP transport.
pub struct HttpRelayTransport {
    client: Client,
    url: Url,
}

impl HttpRelayTransport {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn deliver(&self, payload: &RelayPayload) -> Result<(), RelayError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, RELAY_USER_AGENT)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::Status(status.as_u16()))
        }
    }

    fn target(&self) -> String {
        redacted_target(&self.url)
    }
}

/// Scheme and host only; relay URLs usually embed a secret path.
fn redacted_target(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or("unknown"))
}

/// Fans status events out to the relay target, when one is configured.
#[derive(Clone)]
pub struct NotificationRelay {
    transport: Option<Arc<dyn RelayTransport>>,
    account_sid: String,
}

impl NotificationRelay {
    pub fn new(transport: Option<Arc<dyn RelayTransport>>, account_sid: String) -> Self {
        Self {
            transport,
            account_sid,
        }
    }

    /// A relay with no target; every emit is a no-op.
    pub fn disabled(account_sid: String) -> Self {
        Self::new(None, account_sid)
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Deliver `event` once. Never fails; delivery errors are logged and dropped.
    pub async fn emit(&self, event: StatusEvent) {
        let Some(transport) = &self.transport else {
            return;
        };

        let name = event.kind.name();
        let routine = event.kind.is_routine();
        let call_sid = event.kind.call_sid().unwrap_or("").to_string();
        let payload = RelayPayload::new(self.account_sid.clone(), event);

        match transport.deliver(&payload).await {
            Ok(()) => {
                metrics::counter!("dialer_relay_delivered_total", "event" => name).increment(1);
                if routine {
                    debug!(event = name, call_sid = %call_sid, "Relayed status event");
                } else {
                    info!(
                        event = name,
                        call_sid = %call_sid,
                        target = %transport.target(),
                        "Relayed status event"
                    );
                }
            }
            Err(err) => {
                metrics::counter!("dialer_relay_failed_total", "event" => name).increment(1);
                if !routine {
                    warn!(
                        event = name,
                        call_sid = %call_sid,
                        target = %transport.target(),
                        error = %err,
                        "Relay delivery failed"
                    );
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;
    use crate::models::{CallStatus, EventKind};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn initiated() -> StatusEvent {
        StatusEvent::new(EventKind::CallInitiated {
            call_sid: "CA1".to_string(),
            status: CallStatus::Ringing,
        })
    }

    #[tokio::test]
    async fn test_disabled_relay_is_silent() {
        let relay = NotificationRelay::disabled("AC1".to_string());
        assert!(!relay.is_enabled());
        relay.emit(initiated()).await;
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let transport = Arc::new(RecordingTransport::failing());
        let relay = NotificationRelay::new(Some(transport.clone()), "AC1".to_string());

        relay.emit(initiated()).await;
        assert_eq!(transport.events().await, vec!["call_initiated"]);
    }

    #[tokio::test]
    async fn test_http_transport_posts_json_with_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhook/calls"))
            .and(header("user-agent", "Twilio-Call-System/2.0"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "event": "call_initiated",
                "callSid": "CA1",
                "status": "ringing",
                "accountSid": "AC1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/webhook/calls", server.uri())).unwrap();
        let transport = HttpRelayTransport::new(url, Duration::from_secs(5)).unwrap();
        let relay = NotificationRelay::new(Some(Arc::new(transport)), "AC1".to_string());

        relay.emit(initiated()).await;
    }

    #[tokio::test]
    async fn test_http_transport_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let transport = HttpRelayTransport::new(url, Duration::from_millis(50)).unwrap();
        let payload = RelayPayload::new("AC1".to_string(), initiated());

        let err = transport.deliver(&payload).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout));
    }

    #[tokio::test]
    async fn test_http_transport_reports_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let transport = HttpRelayTransport::new(url, Duration::from_secs(5)).unwrap();
        let payload = RelayPayload::new("AC1".to_string(), initiated());

        assert!(matches!(
            transport.deliver(&payload).await,
            Err(RelayError::Status(503))
        ));
        assert_eq!(transport.target(), "http://127.0.0.1");
    }
}
