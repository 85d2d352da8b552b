//! Messaging channel API consumed by the relay.
//!
//! The channel is where reviews are published and where reviewer membership
//! is enforced. Implementations wrap the platform bot API; the crate ships a
//! recording backend for tests and embedding.

mod memory;

use async_trait::async_trait;

use crate::dispatch::OutboundReview;
use crate::error::ChannelError;
use crate::review::{ChannelId, MessageRef, ReviewerId};

pub use memory::{MembershipOp, RecordingChannel};

/// Operations the relay needs from the messaging platform.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Publishes a review to `channel` and returns where it landed.
    async fn publish(&self, channel: ChannelId, review: &OutboundReview) -> Result<MessageRef, ChannelError>;

    /// Removes a member without a standing ban, so they may ask to rejoin.
    ///
    /// Implementations typically ban for a short period and unban at once.
    async fn remove_member(&self, channel: ChannelId, identity: ReviewerId, reason: &str) -> Result<(), ChannelError>;

    /// Lifts any standing block on `identity`. Idempotent.
    async fn unblock_member(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError>;

    /// Accepts a pending join request.
    async fn approve_join(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError>;

    /// Declines a pending join request.
    async fn decline_join(&self, channel: ChannelId, identity: ReviewerId) -> Result<(), ChannelError>;
}
