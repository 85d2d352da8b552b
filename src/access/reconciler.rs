//! Access reconciler task.
//!
//! Owns the previous rights snapshot. Everything that reads or updates it
//! (signal-driven passes, on-demand syncs, join requests) runs on this task,
//! the latter two arriving as [`AccessCommand`]s.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::channel::ChannelApi;
use crate::error::{ChannelError, RelayError, RelayResult};
use crate::health::AccessHealthWriter;
use crate::review::{ChannelId, ReviewKind, ReviewerId, ReviewerRightsSnapshot};
use crate::signal::{ShutdownSignal, WakeSignal};
use crate::storage::ReviewStore;

use super::plan::plan_access_changes;

/// Reason passed to the channel when a reviewer loses access.
pub const REVOKE_REASON: &str = "review_rights_revoked";

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    /// Channel reconciled, `None` when no channel is configured.
    pub channel: Option<ChannelId>,
    /// Identities removed this pass.
    pub revoked: Vec<ReviewerId>,
    /// Identities unblocked this pass.
    pub restored: Vec<ReviewerId>,
    /// Identities whose revoke or restore call failed.
    pub failed: Vec<ReviewerId>,
    /// Whether the pass ignored the previous snapshot.
    pub full_scan: bool,
}

/// What happened to a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinDecision {
    /// The identity may review and was let in.
    Approved,
    /// The identity may not review.
    Declined,
    /// The request was for some other channel.
    Ignored,
}

/// Requests served by the reconciler task.
#[derive(Debug)]
pub enum AccessCommand {
    /// A join request for `channel`.
    JoinRequest {
        channel: ChannelId,
        identity: ReviewerId,
        reply: oneshot::Sender<RelayResult<JoinDecision>>,
    },
    /// Run one reconciliation pass now.
    SyncNow {
        reply: oneshot::Sender<RelayResult<AccessReport>>,
    },
}

/// Cloneable sender side of the reconciler's command queue.
#[derive(Debug, Clone)]
pub struct AccessHandle {
    tx: mpsc::Sender<AccessCommand>,
}

impl AccessHandle {
    /// Creates a handle and the receiver to pass to [`AccessReconciler::run`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<AccessCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Approves or declines a pending join request.
    ///
    /// # Errors
    ///
    /// Returns an error if the store call fails or the reconciler has
    /// stopped.
    pub async fn join_request(&self, channel: ChannelId, identity: ReviewerId) -> RelayResult<JoinDecision> {
        let (reply, rx) = oneshot::channel();
        self.send(AccessCommand::JoinRequest {
            channel,
            identity,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Runs a reconciliation pass now and returns its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails as a whole, or if the reconciler
    /// has stopped.
    pub async fn sync_now(&self) -> RelayResult<AccessReport> {
        let (reply, rx) = oneshot::channel();
        self.send(AccessCommand::SyncNow { reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    async fn send(&self, cmd: AccessCommand) -> RelayResult<()> {
        self.tx.send(cmd).await.map_err(|_| stopped())
    }
}

fn stopped() -> RelayError {
    RelayError::internal("access reconciler stopped")
}

/// Keeps channel membership in line with reviewer rights.
pub struct AccessReconciler {
    store: Arc<dyn ReviewStore>,
    channel_api: Arc<dyn ChannelApi>,
    kind: ReviewKind,
    super_reviewer: Option<ReviewerId>,
    health: AccessHealthWriter,
    previous: ReviewerRightsSnapshot,
    previous_channel: Option<ChannelId>,
}

impl AccessReconciler {
    /// Reconciles the deposit review channel.
    pub fn new(
        store: Arc<dyn ReviewStore>,
        channel_api: Arc<dyn ChannelApi>,
        super_reviewer: Option<ReviewerId>,
        health: AccessHealthWriter,
    ) -> Self {
        Self {
            store,
            channel_api,
            kind: ReviewKind::Deposit,
            super_reviewer,
            health,
            previous: ReviewerRightsSnapshot::new(),
            previous_channel: None,
        }
    }

    /// Reconciles the channel of `kind` instead.
    #[must_use]
    pub fn with_kind(mut self, kind: ReviewKind) -> Self {
        self.kind = kind;
        self
    }

    /// Snapshot the next incremental pass diffs against.
    #[must_use]
    pub const fn previous(&self) -> (&ReviewerRightsSnapshot, Option<ChannelId>) {
        (&self.previous, self.previous_channel)
    }

    /// Runs until `stop` is requested.
    pub async fn run(mut self, mut stop: ShutdownSignal, signal: Arc<WakeSignal>, mut commands: mpsc::Receiver<AccessCommand>) {
        info!(kind = %self.kind, "Review access loop started");
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                () = stop.requested() => break,
                () = signal.wait() => {
                    let _ = self.tick().await;
                }
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => commands_open = false,
                },
            }
        }
        debug!(kind = %self.kind, "Review access loop stopped");
    }

    async fn handle(&mut self, cmd: AccessCommand) {
        match cmd {
            AccessCommand::JoinRequest {
                channel,
                identity,
                reply,
            } => {
                let _ = reply.send(self.join_request(channel, identity).await);
            }
            AccessCommand::SyncNow { reply } => {
                let _ = reply.send(self.tick().await);
            }
        }
    }

    /// Runs one pass and records it in health.
    ///
    /// # Errors
    ///
    /// Returns the pass error after recording it.
    pub async fn tick(&mut self) -> RelayResult<AccessReport> {
        match self.sync_once().await {
            Ok(report) => {
                self.health.pass_finished(&report, Utc::now());
                Ok(report)
            }
            Err(err) => {
                error!(kind = %self.kind, error = %err, "Review access sync failed");
                self.health.pass_failed("access_sync_failed", Utc::now());
                Err(err)
            }
        }
    }

    /// One reconciliation pass.
    ///
    /// Per-identity channel failures are collected in the report; the
    /// snapshot is advanced regardless.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store cannot be read.
    #[instrument(skip(self), fields(kind = %self.kind), level = "debug")]
    pub async fn sync_once(&mut self) -> RelayResult<AccessReport> {
        let Some(channel) = self.store.resolve_channel(self.kind).await? else {
            if self.previous_channel.is_some() || !self.previous.is_empty() {
                info!("Review channel unset, dropping tracked access state");
            }
            self.previous = ReviewerRightsSnapshot::new();
            self.previous_channel = None;
            return Ok(AccessReport::default());
        };

        let current = self
            .store
            .current_snapshot(self.kind)
            .await?
            .without(self.super_reviewer);
        let plan = plan_access_changes(&self.previous, self.previous_channel, &current, channel);

        let mut report = AccessReport {
            channel: Some(channel),
            full_scan: plan.full_scan,
            ..AccessReport::default()
        };

        for identity in &plan.revoke {
            let result = self.channel_api.remove_member(channel, *identity, REVOKE_REASON).await;
            match result {
                Ok(()) => report.revoked.push(*identity),
                Err(err) => self.membership_failed(channel, *identity, "revoke", &err, &mut report),
            }
        }
        for identity in &plan.restore {
            match self.channel_api.unblock_member(channel, *identity).await {
                Ok(()) => report.restored.push(*identity),
                Err(err) => self.membership_failed(channel, *identity, "restore", &err, &mut report),
            }
        }

        self.previous = current;
        self.previous_channel = Some(channel);

        if !plan.is_empty() {
            info!(
                %channel,
                full_scan = report.full_scan,
                revoked = report.revoked.len(),
                restored = report.restored.len(),
                failed = report.failed.len(),
                "Review access synced"
            );
        }
        Ok(report)
    }

    fn membership_failed(
        &self,
        channel: ChannelId,
        identity: ReviewerId,
        op: &str,
        err: &ChannelError,
        report: &mut AccessReport,
    ) {
        if err.is_benign_membership_error() {
            debug!(kind = %self.kind, %channel, %identity, op, error = %err, "Review access change skipped");
        } else {
            warn!(kind = %self.kind, %channel, %identity, op, error = %err, "Review access change failed");
        }
        report.failed.push(identity);
    }

    /// Approves a join request iff the identity may review.
    ///
    /// Identities present in the rights table are recorded into the tracked
    /// snapshot with the decision, so the next incremental pass does not redo
    /// it. Outsiders are not recorded: a later pass must not remove a member
    /// who never joined. A failed approve or decline call is logged and the
    /// decision still stands.
    ///
    /// # Errors
    ///
    /// Returns store errors. Nothing is recorded on error.
    pub async fn join_request(&mut self, channel: ChannelId, identity: ReviewerId) -> RelayResult<JoinDecision> {
        let configured = self.store.resolve_channel(self.kind).await?;
        if configured != Some(channel) {
            debug!(kind = %self.kind, %channel, %identity, "Join request for another channel ignored");
            return Ok(JoinDecision::Ignored);
        }

        let rights = self.store.current_snapshot(self.kind).await?;
        let is_super = self.super_reviewer == Some(identity);
        let allowed = is_super || rights.is_allowed(identity);

        let (op, result) = if allowed {
            ("approve_join", self.channel_api.approve_join(channel, identity).await)
        } else {
            ("decline_join", self.channel_api.decline_join(channel, identity).await)
        };
        if let Err(err) = result {
            if err.is_benign_membership_error() {
                debug!(kind = %self.kind, %channel, %identity, op, error = %err, "Review join request call skipped");
            } else {
                warn!(kind = %self.kind, %channel, %identity, op, error = %err, "Review join request call failed");
            }
        }
        if !is_super && identity.is_valid() && rights.contains(identity) {
            self.previous.insert(identity, allowed);
        }

        info!(kind = %self.kind, %channel, %identity, allowed, "Review join request handled");
        Ok(if allowed {
            JoinDecision::Approved
        } else {
            JoinDecision::Declined
        })
    }
}
