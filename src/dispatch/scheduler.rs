//! Dispatch scheduler.
//!
//! Single consumer loop: wakes on the dispatch signal or the fallback timer,
//! then publishes and claims every pending item it can, per kind, oldest
//! first. Publish happens before claim. If the claim then loses a race the
//! message stays posted and the item is counted as a duplicate; decisions are
//! taken against the claimed record only, so a duplicate post cannot be
//! decided twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::ChannelApi;
use crate::error::{RelayError, RelayResult};
use crate::health::DispatchHealthWriter;
use crate::review::{ChannelId, ReviewItem, ReviewKind};
use crate::signal::{ShutdownSignal, WakeSignal};
use crate::storage::ReviewStore;

use super::outbound::OutboundReview;

/// Outcome of one dispatch pass over all kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Successful claims of deposit items.
    pub deposit_sent: u64,
    /// Successful claims of kyc items.
    pub kyc_sent: u64,
    /// Published, but the claim was lost to someone else.
    pub duplicates: u64,
    /// Left unclaimed on purpose (blank id or nothing to publish).
    pub skipped: u64,
    /// Publish or claim failed for the item.
    pub failed: u64,
}

impl DispatchReport {
    /// Items claimed for `kind` this pass.
    #[must_use]
    pub const fn sent(&self, kind: ReviewKind) -> u64 {
        match kind {
            ReviewKind::Deposit => self.deposit_sent,
            ReviewKind::Kyc => self.kyc_sent,
        }
    }

    fn record_sent(&mut self, kind: ReviewKind) {
        match kind {
            ReviewKind::Deposit => self.deposit_sent += 1,
            ReviewKind::Kyc => self.kyc_sent += 1,
        }
    }
}

enum ItemOutcome {
    Sent,
    Duplicate,
    Skipped,
}

/// Publishes pending review items and claims them.
pub struct DispatchScheduler {
    store: Arc<dyn ReviewStore>,
    channel: Arc<dyn ChannelApi>,
    batch_limit: usize,
    fallback_interval: Duration,
    health: DispatchHealthWriter,
}

impl DispatchScheduler {
    /// `batch_limit` and `fallback_interval` are expected to be already
    /// clamped (see [`crate::config::RelayConfig`]).
    pub fn new(
        store: Arc<dyn ReviewStore>,
        channel: Arc<dyn ChannelApi>,
        batch_limit: usize,
        fallback_interval: Duration,
        health: DispatchHealthWriter,
    ) -> Self {
        Self {
            store,
            channel,
            batch_limit: batch_limit.max(1),
            fallback_interval,
            health,
        }
    }

    /// Runs until `stop` is requested.
    pub async fn run(self, mut stop: ShutdownSignal, signal: Arc<WakeSignal>) {
        info!(
            batch_limit = self.batch_limit,
            fallback_ms = self.fallback_interval.as_millis() as u64,
            "Review dispatch loop started"
        );
        loop {
            tokio::select! {
                biased;
                () = stop.requested() => break,
                woken = signal.wait_timeout(self.fallback_interval) => {
                    if !woken {
                        debug!("Review dispatch fallback wake");
                    }
                }
            }
            self.tick().await;
        }
        debug!("Review dispatch loop stopped");
    }

    /// Runs one pass and records it in health. Never fails.
    pub async fn tick(&self) -> Option<DispatchReport> {
        self.health.pass_started(Utc::now());
        match self.run_pass().await {
            Ok(report) => {
                self.health.pass_finished(report.deposit_sent, report.kyc_sent, Utc::now());
                Some(report)
            }
            Err(err) => {
                error!(error = %err, transient = err.is_transient(), "Review dispatch pass failed");
                self.health.pass_failed("dispatch_failed", Utc::now());
                None
            }
        }
    }

    /// One pass over every kind.
    ///
    /// # Errors
    ///
    /// Returns the first store error that prevents a kind from being
    /// scanned. Per-item failures are counted, not returned.
    #[instrument(skip(self), level = "debug")]
    pub async fn run_pass(&self) -> RelayResult<DispatchReport> {
        let mut report = DispatchReport::default();
        for kind in ReviewKind::ALL {
            let Some(channel) = self.store.resolve_channel(kind).await? else {
                debug!(%kind, "No review channel configured, skipping");
                continue;
            };
            self.dispatch_kind(kind, channel, &mut report).await?;
        }
        if report.deposit_sent + report.kyc_sent > 0 {
            info!(
                deposit = report.deposit_sent,
                kyc = report.kyc_sent,
                duplicates = report.duplicates,
                "Review dispatch pass finished"
            );
        }
        Ok(report)
    }

    async fn dispatch_kind(&self, kind: ReviewKind, channel: ChannelId, report: &mut DispatchReport) -> RelayResult<()> {
        let pending = self.store.fetch_pending(kind, self.batch_limit).await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(%kind, %channel, pending = pending.len(), "Dispatching reviews");

        for item in &pending {
            match self.dispatch_item(channel, item).await {
                Ok(ItemOutcome::Sent) => report.record_sent(kind),
                Ok(ItemOutcome::Duplicate) => report.duplicates += 1,
                Ok(ItemOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(%kind, request = %item.id, error = %err, "Review dispatch failed for item");
                }
            }
        }
        Ok(())
    }

    async fn dispatch_item(&self, channel: ChannelId, item: &ReviewItem) -> RelayResult<ItemOutcome> {
        if item.id.is_blank() {
            warn!(kind = %item.kind, "Skipping review item with blank id");
            return Ok(ItemOutcome::Skipped);
        }
        if item.attachment.is_empty() {
            // Left pending; picked up again once the producer repairs it.
            warn!(kind = %item.kind, request = %item.id, "Skipping review item without proof");
            return Ok(ItemOutcome::Skipped);
        }

        let review = OutboundReview::from_item(item);
        let target = self.channel.publish(channel, &review).await.map_err(RelayError::from)?;

        if !self.store.claim(item.kind, &item.id, target).await? {
            info!(
                kind = %item.kind,
                request = %item.id,
                message_id = target.message_id,
                "Skipped duplicate review dispatch"
            );
            return Ok(ItemOutcome::Duplicate);
        }

        info!(
            kind = %item.kind,
            request = %item.id,
            ticket = %review.ticket,
            message_id = target.message_id,
            lag_secs = item.lag_seconds(Utc::now()),
            "Review dispatched"
        );
        Ok(ItemOutcome::Sent)
    }
}
