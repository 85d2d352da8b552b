//! Abstract backing-store traits.
//!
//! Implementations must make `claim` an atomic conditional update: it
//! succeeds only for the call that moves an item out of the unclaimed state.
//! Everything else may be eventually consistent.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use uuid::Uuid;

use crate::error::StoreError;
use crate::review::{ChannelId, MessageRef, ReviewItem, ReviewItemId, ReviewKind, ReviewerId, ReviewerRightsSnapshot};

/// Review items and reviewer rights.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Unclaimed items of `kind`, oldest first, at most `limit` (≥ 1).
    async fn fetch_pending(&self, kind: ReviewKind, limit: usize) -> Result<Vec<ReviewItem>, StoreError>;

    /// Conditionally claims an item, recording where it was published.
    ///
    /// Returns true iff this call transitioned the item from unclaimed to
    /// claimed. Items that are already claimed or no longer pending yield
    /// `Ok(false)`, never an error.
    async fn claim(&self, kind: ReviewKind, id: &ReviewItemId, target: MessageRef) -> Result<bool, StoreError>;

    /// Destination channel for `kind`, if one is configured.
    ///
    /// Read fresh on every pass; operators may change it at runtime.
    async fn resolve_channel(&self, kind: ReviewKind) -> Result<Option<ChannelId>, StoreError>;

    /// Current reviewer rights for `kind`.
    async fn current_snapshot(&self, kind: ReviewKind) -> Result<ReviewerRightsSnapshot, StoreError>;

    /// Whether `reviewer` may decide on items of `kind`.
    async fn is_reviewer_allowed(&self, kind: ReviewKind, reviewer: ReviewerId) -> Result<bool, StoreError> {
        Ok(self.current_snapshot(kind).await?.is_allowed(reviewer))
    }
}

/// Unique identifier for a live subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received on a pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Channel the message was published on.
    pub channel: String,
    /// Raw payload text.
    pub payload: String,
}

/// Stream of notifications. An `Err` item or the end of the stream means the
/// subscription was lost.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Result<Notification, StoreError>> + Send>>;

/// A live subscription handle.
///
/// Handles are never reused: after a loss the listener drops this one and
/// subscribes again.
pub struct Subscription {
    id: SubscriptionId,
    channel: String,
    messages: NotificationStream,
}

impl Subscription {
    /// Wraps a message stream under a fresh id.
    #[must_use]
    pub fn new(channel: impl Into<String>, messages: NotificationStream) -> Self {
        Self {
            id: SubscriptionId::new(),
            channel: channel.into(),
            messages,
        }
    }

    /// Identifier of this handle.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Subscribed channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The underlying message stream.
    pub fn messages(&mut self) -> &mut NotificationStream {
        &mut self.messages
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Pub/sub side of the backing store.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Opens a fresh subscription to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;
}
