//! Process-wide health record for diagnostics.
//!
//! The record is split into one section per writer. Each section lives
//! behind its own `watch` channel whose sender is owned by exactly one task,
//! so no field ever has two writers. Readers only see projections through
//! [`HealthMonitor`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::review::{ChannelId, ReviewKind};

/// Maximum number of characters kept from a notification payload.
pub const NOTIFY_PAYLOAD_LIMIT: usize = 180;

/// First [`NOTIFY_PAYLOAD_LIMIT`] characters of an untrusted payload.
#[must_use]
pub fn truncate_payload(payload: &str) -> String {
    payload.chars().take(NOTIFY_PAYLOAD_LIMIT).collect()
}

/// Listener section. Written by the notification listener only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListenerHealth {
    /// Whether a subscription is live.
    pub connected: bool,
    /// Subscribed pub/sub channel.
    pub channel: String,
    /// Time of the latest successful connect.
    pub connected_at: Option<DateTime<Utc>>,
    /// Successful connects since start.
    pub connects: u64,
    /// Marker of the latest failure, cleared on connect.
    pub last_error: Option<String>,
    /// Time of the latest failure.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Time of the latest notification.
    pub last_notify_at: Option<DateTime<Utc>>,
    /// Truncated copy of the latest payload.
    pub last_notify_payload: Option<String>,
}

/// Dispatch section. Written by the dispatch scheduler only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchHealth {
    /// Start of the latest pass.
    pub last_started_at: Option<DateTime<Utc>>,
    /// End of the latest successful pass.
    pub last_finished_at: Option<DateTime<Utc>>,
    /// Deposit items claimed by the latest pass.
    pub last_deposit_sent: u64,
    /// KYC items claimed by the latest pass.
    pub last_kyc_sent: u64,
    /// `dispatch_failed` when the latest pass failed.
    pub last_error: Option<String>,
    /// Passes run since start.
    pub passes: u64,
}

impl DispatchHealth {
    /// Items claimed for `kind` in the last finished pass.
    #[must_use]
    pub const fn last_sent(&self, kind: ReviewKind) -> u64 {
        match kind {
            ReviewKind::Deposit => self.last_deposit_sent,
            ReviewKind::Kyc => self.last_kyc_sent,
        }
    }
}

/// Access section. Written by the access reconciler only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessHealth {
    /// End of the latest pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Channel reconciled by the latest pass.
    pub channel: Option<ChannelId>,
    /// Identities removed by the latest pass.
    pub last_revoked: usize,
    /// Identities unblocked by the latest pass.
    pub last_restored: usize,
    /// Failed membership calls in the latest pass.
    pub last_failed: usize,
    /// Whether the latest pass was a full scan.
    pub last_full_scan: bool,
    /// `access_sync_failed` when the latest pass failed.
    pub last_error: Option<String>,
    /// Passes run since start.
    pub passes: u64,
}

/// Point-in-time view of all sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// When the snapshot was built.
    pub taken_at: DateTime<Utc>,
    /// Listener section.
    pub listener: ListenerHealth,
    /// Dispatch section.
    pub dispatch: DispatchHealth,
    /// Access section.
    pub access: AccessHealth,
}

impl HealthSnapshot {
    /// True while the listener holds a subscription.
    #[must_use]
    pub const fn listener_live(&self) -> bool {
        self.listener.connected
    }
}

/// Creates the health record for a listener subscribed to `channel`.
#[must_use]
pub fn health_state(channel: &str) -> (HealthMonitor, HealthWriters) {
    let (listener_tx, listener_rx) = watch::channel(ListenerHealth {
        channel: channel.to_string(),
        ..ListenerHealth::default()
    });
    let (dispatch_tx, dispatch_rx) = watch::channel(DispatchHealth::default());
    let (access_tx, access_rx) = watch::channel(AccessHealth::default());

    let monitor = HealthMonitor {
        listener: listener_rx,
        dispatch: dispatch_rx,
        access: access_rx,
    };
    let writers = HealthWriters {
        listener: ListenerHealthWriter { tx: listener_tx },
        dispatch: DispatchHealthWriter { tx: dispatch_tx },
        access: AccessHealthWriter { tx: access_tx },
    };
    (monitor, writers)
}

/// The three writer handles, to be moved into their owning tasks.
#[allow(missing_docs)]
#[derive(Debug)]
pub struct HealthWriters {
    /// Handed to the notification listener.
    pub listener: ListenerHealthWriter,
    /// Handed to the dispatch scheduler.
    pub dispatch: DispatchHealthWriter,
    /// Handed to the access reconciler.
    pub access: AccessHealthWriter,
}

/// Read-only view of the health record.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    listener: watch::Receiver<ListenerHealth>,
    dispatch: watch::Receiver<DispatchHealth>,
    access: watch::Receiver<AccessHealth>,
}

impl HealthMonitor {
    /// Copies all three sections.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            taken_at: Utc::now(),
            listener: self.listener(),
            dispatch: self.dispatch(),
            access: self.access(),
        }
    }

    /// Current listener section.
    #[must_use]
    pub fn listener(&self) -> ListenerHealth {
        self.listener.borrow().clone()
    }

    /// Current dispatch section.
    #[must_use]
    pub fn dispatch(&self) -> DispatchHealth {
        self.dispatch.borrow().clone()
    }

    /// Current access section.
    #[must_use]
    pub fn access(&self) -> AccessHealth {
        self.access.borrow().clone()
    }

    /// Subscribe to listener updates.
    #[must_use]
    pub fn listener_updates(&self) -> watch::Receiver<ListenerHealth> {
        self.listener.clone()
    }

    /// Subscribe to dispatch updates.
    #[must_use]
    pub fn dispatch_updates(&self) -> watch::Receiver<DispatchHealth> {
        self.dispatch.clone()
    }

    /// Subscribe to access updates.
    #[must_use]
    pub fn access_updates(&self) -> watch::Receiver<AccessHealth> {
        self.access.clone()
    }
}

/// Sole writer of [`ListenerHealth`].
#[derive(Debug)]
pub struct ListenerHealthWriter {
    tx: watch::Sender<ListenerHealth>,
}

impl ListenerHealthWriter {
    /// Records a successful connect and clears the error marker.
    pub fn connected(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.connected = true;
            h.connected_at = Some(at);
            h.connects += 1;
            h.last_error = None;
        });
    }

    /// Records a lost or failed connection.
    pub fn disconnected(&self, error: &str, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.connected = false;
            h.last_error = Some(error.to_string());
            h.last_error_at = Some(at);
        });
    }

    /// Records a received payload, truncated.
    pub fn notified(&self, payload: &str, at: DateTime<Utc>) {
        let truncated = truncate_payload(payload);
        self.tx.send_modify(|h| {
            h.last_notify_at = Some(at);
            h.last_notify_payload = Some(truncated);
        });
    }
}

/// Sole writer of [`DispatchHealth`].
#[derive(Debug)]
pub struct DispatchHealthWriter {
    tx: watch::Sender<DispatchHealth>,
}

impl DispatchHealthWriter {
    /// Records the start of a pass.
    pub fn pass_started(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.last_started_at = Some(at);
            h.last_error = None;
        });
    }

    /// Records a successful pass and clears the error marker.
    pub fn pass_finished(&self, deposit_sent: u64, kyc_sent: u64, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.last_finished_at = Some(at);
            h.last_deposit_sent = deposit_sent;
            h.last_kyc_sent = kyc_sent;
            h.last_error = None;
            h.passes += 1;
        });
    }

    /// Records a pass that failed as a whole. Counters keep their last values.
    pub fn pass_failed(&self, marker: &str, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.last_finished_at = Some(at);
            h.last_error = Some(marker.to_string());
            h.passes += 1;
        });
    }
}

/// Sole writer of [`AccessHealth`].
#[derive(Debug)]
pub struct AccessHealthWriter {
    tx: watch::Sender<AccessHealth>,
}

impl AccessHealthWriter {
    /// Mirrors a pass report.
    pub fn pass_finished(&self, report: &crate::access::AccessReport, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.last_sync_at = Some(at);
            h.channel = report.channel;
            h.last_revoked = report.revoked.len();
            h.last_restored = report.restored.len();
            h.last_failed = report.failed.len();
            h.last_full_scan = report.full_scan;
            h.last_error = None;
            h.passes += 1;
        });
    }

    /// Records a failed pass under `marker`.
    pub fn pass_failed(&self, marker: &str, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            h.last_sync_at = Some(at);
            h.last_error = Some(marker.to_string());
            h.passes += 1;
        });
    }
}
