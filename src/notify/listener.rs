//! Notification listener.
//!
//! Owns the single pub/sub subscription. On every successful connect it
//! raises both wake signals once, because notifications published while
//! disconnected are lost and both consumers rescan full state anyway. A lost
//! subscription is dropped, recorded in health, and replaced after a fixed
//! backoff. The loop only ends on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::health::{truncate_payload, ListenerHealthWriter};
use crate::signal::{ShutdownSignal, WakeSignal};
use crate::storage::{Notification, NotificationSource, Subscription};

use super::payload::NotifyMessage;

/// Upper bound on a single subscribe attempt.
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener state machine. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    /// No subscription; waiting to retry.
    Disconnected,
    /// A subscribe attempt is in flight.
    Connecting,
    /// Subscription live.
    Connected,
}

enum SessionEnd {
    Stop,
    Lost(String),
}

/// Subscribes to the notify channel and routes messages to wake signals.
pub struct NotificationListener {
    source: Arc<dyn NotificationSource>,
    channel: String,
    retry_interval: Duration,
    dispatch: Arc<WakeSignal>,
    access: Arc<WakeSignal>,
    health: ListenerHealthWriter,
    phase: ListenerPhase,
    ever_connected: bool,
}

impl NotificationListener {
    /// Creates a listener. `retry_interval` is the pause after a failure.
    pub fn new(
        source: Arc<dyn NotificationSource>,
        channel: impl Into<String>,
        retry_interval: Duration,
        dispatch: Arc<WakeSignal>,
        access: Arc<WakeSignal>,
        health: ListenerHealthWriter,
    ) -> Self {
        Self {
            source,
            channel: channel.into(),
            retry_interval,
            dispatch,
            access,
            health,
            phase: ListenerPhase::Disconnected,
            ever_connected: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ListenerPhase {
        self.phase
    }

    /// Runs until `stop` is requested.
    pub async fn run(mut self, mut stop: ShutdownSignal) {
        while !stop.is_requested() {
            if let Some(mut subscription) = self.connect().await {
                let end = self.session(&mut subscription, &mut stop).await;
                drop(subscription);
                self.transition(ListenerPhase::Disconnected);
                match end {
                    SessionEnd::Stop => break,
                    SessionEnd::Lost(reason) => {
                        warn!(channel = %self.channel, %reason, "Review listener lost, retrying...");
                        self.health.disconnected("listener_lost", Utc::now());
                    }
                }
            }

            tokio::select! {
                () = stop.requested() => break,
                () = tokio::time::sleep(self.retry_interval) => {}
            }
        }
        debug!(channel = %self.channel, "Review listener stopped");
    }

    async fn connect(&mut self) -> Option<Subscription> {
        self.transition(ListenerPhase::Connecting);
        let attempt = tokio::time::timeout(SUBSCRIBE_TIMEOUT, self.source.subscribe(&self.channel)).await;
        match attempt {
            Ok(Ok(subscription)) => {
                if self.ever_connected {
                    info!(channel = %self.channel, subscription = %subscription.id(), "Review listener reconnected");
                } else {
                    info!(channel = %self.channel, subscription = %subscription.id(), "Listening review channel");
                }
                self.ever_connected = true;
                self.transition(ListenerPhase::Connected);
                self.health.connected(Utc::now());
                // Catch-up pass for anything published while disconnected.
                self.dispatch.raise();
                self.access.raise();
                Some(subscription)
            }
            Ok(Err(err)) => {
                warn!(channel = %self.channel, error = %err, "Failed to start review listener, retrying...");
                self.connect_failed("listener_connect_failed");
                None
            }
            Err(_) => {
                warn!(channel = %self.channel, timeout_ms = SUBSCRIBE_TIMEOUT.as_millis() as u64, "Review listener subscribe timed out");
                self.connect_failed("listener_connect_timeout");
                None
            }
        }
    }

    fn connect_failed(&mut self, marker: &str) {
        self.transition(ListenerPhase::Disconnected);
        self.health.disconnected(marker, Utc::now());
    }

    async fn session(&self, subscription: &mut Subscription, stop: &mut ShutdownSignal) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                () = stop.requested() => return SessionEnd::Stop,
                next = subscription.messages().next() => match next {
                    Some(Ok(message)) => self.on_message(&message),
                    Some(Err(err)) => return SessionEnd::Lost(err.to_string()),
                    None => return SessionEnd::Lost("subscription closed".to_string()),
                },
            }
        }
    }

    fn on_message(&self, message: &Notification) {
        let payload = message.payload.trim();
        info!(channel = %message.channel, payload = %truncate_payload(payload), "Review notify received");
        self.health.notified(payload, Utc::now());
        match NotifyMessage::classify(payload) {
            NotifyMessage::AccessSync => self.access.raise(),
            NotifyMessage::Dispatch => self.dispatch.raise(),
        }
    }

    fn transition(&mut self, next: ListenerPhase) {
        if self.phase != next {
            debug!(channel = %self.channel, from = ?self.phase, to = ?next, "Review listener phase");
            self.phase = next;
        }
    }
}
