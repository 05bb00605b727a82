//! # Call Monitor
//!
//! Per-call polling monitors. After a call document is served, a monitor
//! searches the provider for the freshly placed call to the target number,
//! then polls it at a fixed cadence and relays every observed status until
//! the call ends, a poll cap or age ceiling is reached, or a webhook reports
//! the call as finished.
//!
//! Each monitor runs on its own task and owns a cancellation token derived
//! from the manager's shutdown token. The registry guarantees at most one
//! live monitor per call sid; removal is idempotent so a polling task and a
//! webhook may race to stop the same monitor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::call_document::MonitorRequest;
use crate::config::MonitorConfig;
use crate::models::{CallStatus, ConnectionContext, EventKind, StatusEvent};
use crate::relay::NotificationRelay;
use crate::twilio::CallProvider;

/// Number of recent calls inspected when searching for the placed call.
const SEARCH_PAGE_SIZE: u32 = 5;

/// Why a monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TerminalStatus,
    PollCap,
    AgeCeiling,
    Cancelled,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            StopReason::TerminalStatus => "terminal_status",
            StopReason::PollCap => "poll_cap",
            StopReason::AgeCeiling => "age_ceiling",
            StopReason::Cancelled => "cancelled",
        }
    }
}

struct MonitorEntry {
    /// Distinguishes this registration from a later one for the same sid
    monitor_id: Uuid,
    identity: String,
    phone_number: String,
    poll_count: u32,
    last_status: CallStatus,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Read-only view of a live monitor.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub call_sid: String,
    pub identity: String,
    pub phone_number: String,
    pub poll_count: u32,
    pub last_status: CallStatus,
    pub created_at: DateTime<Utc>,
}

/// Owns every live call monitor.
#[derive(Clone)]
pub struct MonitorManager {
    provider: Arc<dyn CallProvider>,
    relay: NotificationRelay,
    settings: MonitorConfig,
    monitors: Arc<Mutex<HashMap<String, MonitorEntry>>>,
    shutdown: CancellationToken,
}

impl MonitorManager {
    pub fn new(
        provider: Arc<dyn CallProvider>,
        relay: NotificationRelay,
        settings: MonitorConfig,
    ) -> Self {
        Self {
            provider,
            relay,
            settings,
            monitors: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start monitoring the call just placed to `request.phone_number`.
    ///
    /// Runs the whole lifecycle on a spawned task: the start delay, the search
    /// and the polling loop. The returned handle completes when the monitor stops.
    pub fn schedule(&self, request: MonitorRequest) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let delay = manager.settings.start_delay() + manager.settings.search_delay();
            tokio::select! {
                _ = manager.shutdown.cancelled() => return,
                _ = sleep(delay) => {}
            }

            let MonitorRequest {
                phone_number,
                identity,
                context,
            } = request;
            manager.run(phone_number, identity, context).await;
        })
    }

    #[instrument(skip_all, fields(phone_number = %phone_number, identity = %identity))]
    async fn run(&self, phone_number: String, identity: String, context: ConnectionContext) {
        let calls = match self
            .provider
            .list_calls(&phone_number, SEARCH_PAGE_SIZE)
            .await
        {
            Ok(calls) => calls,
            Err(err) => {
                warn!(error = %err, "Call search failed; monitoring not started");
                return;
            }
        };

        let Some(call) = calls.into_iter().find(|call| call.status.is_active()) else {
            info!("No active call found to monitor");
            return;
        };

        let Some((monitor_id, cancel)) = self
            .register(&call.sid, &identity, &phone_number, call.status)
            .await
        else {
            debug!(call_sid = %call.sid, "Call already monitored");
            return;
        };

        info!(call_sid = %call.sid, status = %call.status, "Monitoring call");
        counter!("dialer_monitors_started_total").increment(1);
        gauge!("dialer_monitors_active").increment(1.0);

        self.emit(
            EventKind::CallInitiated {
                call_sid: call.sid.clone(),
                status: call.status,
            },
            &identity,
            &context,
        )
        .await;

        let reason = self
            .poll(&call.sid, monitor_id, &cancel, &identity, &context)
            .await;

        self.remove(&call.sid, monitor_id).await;
        counter!("dialer_monitors_stopped_total", "reason" => reason.as_str()).increment(1);
        gauge!("dialer_monitors_active").decrement(1.0);
        info!(call_sid = %call.sid, reason = reason.as_str(), "Stopped monitoring call");
    }

    async fn poll(
        &self,
        call_sid: &str,
        monitor_id: Uuid,
        cancel: &CancellationToken,
        identity: &str,
        context: &ConnectionContext,
    ) -> StopReason {
        let interval = self.settings.poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let age_ceiling = sleep_until(Instant::now() + self.settings.max_age());
        tokio::pin!(age_ceiling);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return StopReason::Cancelled,
                _ = &mut age_ceiling => return StopReason::AgeCeiling,
                _ = ticker.tick() => {}
            }

            let Some(poll_count) = self.record_poll(call_sid, monitor_id).await else {
                return StopReason::Cancelled;
            };
            counter!("dialer_monitor_polls_total").increment(1);

            match self.provider.fetch_call(call_sid).await {
                Ok(snapshot) => {
                    if cancel.is_cancelled() {
                        return StopReason::Cancelled;
                    }

                    debug!(
                        call_sid = %call_sid,
                        poll_count,
                        status = %snapshot.status,
                        duration = snapshot.duration_seconds(),
                        "Polled call status"
                    );
                    self.update_status(call_sid, monitor_id, snapshot.status)
                        .await;

                    self.emit(
                        EventKind::status_update(&snapshot, poll_count),
                        identity,
                        context,
                    )
                    .await;

                    if snapshot.status.is_terminal() {
                        // Terminated while the update was in flight.
                        if cancel.is_cancelled() {
                            return StopReason::Cancelled;
                        }
                        info!(
                            call_sid = %call_sid,
                            status = %snapshot.status,
                            duration = snapshot.duration_seconds(),
                            "Call ended"
                        );
                        self.emit(EventKind::completed(&snapshot), identity, context)
                            .await;
                        return StopReason::TerminalStatus;
                    }
                }
                Err(err) => {
                    counter!("dialer_monitor_poll_errors_total").increment(1);
                    warn!(call_sid = %call_sid, poll_count, error = %err, "Monitoring poll failed");
                }
            }

            if poll_count >= self.settings.max_polls {
                info!(call_sid = %call_sid, poll_count, "Max monitoring polls reached");
                return StopReason::PollCap;
            }
        }
    }

    /// Stop the live monitor for `call_sid`. Returns whether one was running.
    pub async fn terminate(&self, call_sid: &str) -> bool {
        let entry = self.monitors.lock().await.remove(call_sid);
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(call_sid = %call_sid, "Monitor terminated");
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, call_sid: &str) -> bool {
        self.monitors.lock().await.contains_key(call_sid)
    }

    pub async fn snapshot(&self, call_sid: &str) -> Option<MonitorSnapshot> {
        self.monitors
            .lock()
            .await
            .get(call_sid)
            .map(|entry| MonitorSnapshot {
                call_sid: call_sid.to_string(),
                identity: entry.identity.clone(),
                phone_number: entry.phone_number.clone(),
                poll_count: entry.poll_count,
                last_status: entry.last_status,
                created_at: entry.created_at,
            })
    }

    pub async fn active_count(&self) -> usize {
        self.monitors.lock().await.len()
    }

    /// Cancel every live monitor and refuse pending starts.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<_> = self.monitors.lock().await.drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelled live call monitors");
        }
        for (_, entry) in drained {
            entry.cancel.cancel();
        }
    }

    async fn register(
        &self,
        call_sid: &str,
        identity: &str,
        phone_number: &str,
        status: CallStatus,
    ) -> Option<(Uuid, CancellationToken)> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(call_sid) {
            return None;
        }

        let monitor_id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        monitors.insert(
            call_sid.to_string(),
            MonitorEntry {
                monitor_id,
                identity: identity.to_string(),
                phone_number: phone_number.to_string(),
                poll_count: 0,
                last_status: status,
                created_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        Some((monitor_id, cancel))
    }

    async fn record_poll(&self, call_sid: &str, monitor_id: Uuid) -> Option<u32> {
        let mut monitors = self.monitors.lock().await;
        let entry = monitors
            .get_mut(call_sid)
            .filter(|entry| entry.monitor_id == monitor_id)?;
        entry.poll_count += 1;
        Some(entry.poll_count)
    }

    async fn update_status(&self, call_sid: &str, monitor_id: Uuid, status: CallStatus) {
        if let Some(entry) = self
            .monitors
            .lock()
            .await
            .get_mut(call_sid)
            .filter(|entry| entry.monitor_id == monitor_id)
        {
            entry.last_status = status;
        }
    }

    async fn remove(&self, call_sid: &str, monitor_id: Uuid) {
        let mut monitors = self.monitors.lock().await;
        if monitors
            .get(call_sid)
            .is_some_and(|entry| entry.monitor_id == monitor_id)
        {
            monitors.remove(call_sid);
        }
    }

    async fn emit(&self, kind: EventKind, identity: &str, context: &ConnectionContext) {
        let event = StatusEvent::new(kind)
            .with_identity(Some(identity.to_string()))
            .with_context(Some(context));
        self.relay.emit(event).await;
    }
}
