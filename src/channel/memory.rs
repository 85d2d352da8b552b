//! Recording channel backend.
//!
//! Keeps every publish and membership operation in memory, in call order.
//! Errors can be injected per identity (membership) or per review id
//! (publish) to exercise the best-effort paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::channel::ChannelApi;
use crate::dispatch::OutboundReview;
use crate::error::ChannelError;
use crate::review::{ChannelId, MessageRef, ReviewItemId, ReviewerId};

fn lock_err(context: &'static str) -> ChannelError {
    ChannelError::Api(format!("poisoned lock: {context}"))
}

/// A recorded membership call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOp {
    /// Temporary removal (kick).
    Removed {
        channel: ChannelId,
        identity: ReviewerId,
        reason: String,
    },
    /// A standing block was lifted.
    Unblocked {
        channel: ChannelId,
        identity: ReviewerId,
    },
    /// A join request was approved.
    JoinApproved {
        channel: ChannelId,
        identity: ReviewerId,
    },
    /// A join request was declined.
    JoinDeclined {
        channel: ChannelId,
        identity: ReviewerId,
    },
}

impl MembershipOp {
    /// The identity the operation targeted.
    #[must_use]
    pub const fn identity(&self) -> ReviewerId {
        match self {
            Self::Removed { identity, .. }
            | Self::Unblocked { identity, .. }
            | Self::JoinApproved { identity, .. }
            | Self::JoinDeclined { identity, .. } => *identity,
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<(MessageRef, OutboundReview)>,
    membership: Vec<MembershipOp>,
    member_errors: HashMap<ReviewerId, fn() -> ChannelError>,
    publish_errors: HashMap<ReviewItemId, String>,
}

/// In-memory [`ChannelApi`] that records what it was asked to do.
#[derive(Debug)]
pub struct RecordingChannel {
    next_message_id: AtomicI64,
    inner: Mutex<Recorded>,
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingChannel {
    /// Creates an empty recorder. Message ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
            inner: Mutex::new(Recorded::default()),
        }
    }

    /// Makes every membership call for `identity` fail with `make()`.
    pub fn fail_member(&self, identity: ReviewerId, make: fn() -> ChannelError) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().map_err(|_| lock_err("fail_member"))?;
        inner.member_errors.insert(identity, make);
        Ok(())
    }

    /// Makes publishing the review for `id` fail.
    pub fn fail_publish(&self, id: impl Into<ReviewItemId>, message: &str) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().map_err(|_| lock_err("fail_publish"))?;
        inner.publish_errors.insert(id.into(), message.to_string());
        Ok(())
    }

    /// Published reviews, in order.
    pub fn published(&self) -> Result<Vec<(MessageRef, OutboundReview)>, ChannelError> {
        let inner = self.inner.lock().map_err(|_| lock_err("published"))?;
        Ok(inner.published.clone())
    }

    /// Membership operations, in order.
    pub fn membership(&self) -> Result<Vec<MembershipOp>, ChannelError> {
        let inner = self.inner.lock().map_err(|_| lock_err("membership"))?;
        Ok(inner.membership.clone())
    }

    /// Forgets everything recorded so far. Injected errors are kept.
    pub fn reset(&self) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().map_err(|_| lock_err("reset"))?;
        inner.published.clear();
        inner.membership.clear();
        Ok(())
    }

    fn member_op(&self, identity: ReviewerId, op: MembershipOp) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().map_err(|_| lock_err("member_op"))?;
        if let Some(make) = inner.member_errors.get(&identity) {
            return Err(make());
        }
        inner.membership.push(op);
        Ok(())
    }
}

#[async_trait]
impl ChannelApi for RecordingChannel {
    async fn publish(&self, channel: ChannelId, review: &OutboundReview) -> Result<MessageRef, ChannelError> {
        let mut inner = self.inner.lock().map_err(|_| lock_err("publish"))?;
        if let Some(message) = inner.publish_errors.get(&review.item_id) {
            return Err(ChannelError::Api(message.clone()));
        }
        let target = MessageRef {
            channel,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
        };
        inner.published.push((target, review.clone()));
        Ok(target)
    }

    async fn remove_member(&self, channel: ChannelId, identity: ReviewerId, reason: &str) -> Result<(), ChannelError> {
        self.member_op(
            identity,
            MembershipOp::Removed {
                channel,
                identity,
                reason: reason.to_string(),
            },
        )
    }

    async fn unblock_member(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError> {
        self.member_op(identity, MembershipOp::Unblocked { channel, identity })
    }

    async fn approve_join(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError> {
        self.member_op(identity, MembershipOp::JoinApproved { channel, identity })
    }

    async fn decline_join(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError> {
        self.member_op(identity, MembershipOp::JoinDeclined { channel, identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{ReviewItem, ReviewKind};
    use chrono::Utc;

    fn review(id: &str) -> OutboundReview {
        OutboundReview::from_item(&ReviewItem::new(id, ReviewKind::Deposit, Utc::now(), 1))
    }

    #[tokio::test]
    async fn publish_assigns_increasing_message_ids() {
        let channel = RecordingChannel::new();
        let a = channel.publish(ChannelId::new(-1), &review("a")).await.unwrap();
        let b = channel.publish(ChannelId::new(-1), &review("b")).await.unwrap();
        assert!(b.message_id > a.message_id);
        assert_eq!(channel.published().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_errors_are_returned_and_not_recorded() {
        let channel = RecordingChannel::new();
        let id = ReviewerId::new(9);
        channel
            .fail_member(id, || ChannelError::Api("Bad Request: user not found".to_string()))
            .unwrap();
        let err = channel.remove_member(ChannelId::new(-1), id, "x").await.unwrap_err();
        assert!(err.is_benign_membership_error());
        assert!(channel.membership().unwrap().is_empty());

        channel.fail_publish("a", "boom").unwrap();
        assert!(channel.publish(ChannelId::new(-1), &review("a")).await.is_err());
        assert!(channel.published().unwrap().is_empty());
    }
}
