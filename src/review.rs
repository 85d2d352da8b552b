//! Core review types.
//!
//! A `ReviewItem` is a pending deposit or identity-verification request that
//! moderators decide on. Items are produced elsewhere; this crate only moves
//! them from unclaimed to claimed, exactly once.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of review work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// A real-money deposit awaiting proof verification.
    Deposit,
    /// An identity-verification (KYC) request.
    Kyc,
}

impl ReviewKind {
    /// All kinds, in dispatch order.
    pub const ALL: [Self; 2] = [Self::Deposit, Self::Kyc];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Kyc => "kyc",
        }
    }

    /// Fixed prefix of human-readable ticket codes.
    #[must_use]
    pub const fn ticket_prefix(self) -> &'static str {
        match self {
            Self::Deposit => "BXdep",
            Self::Kyc => "BXkyc",
        }
    }

    /// Tag mixed into the ticket letter hash.
    ///
    /// Deposits hash under their ledger name, not under `as_str()`; previously
    /// issued codes depend on it.
    #[must_use]
    pub const fn ticket_tag(self) -> &'static str {
        match self {
            Self::Deposit => "real_deposit",
            Self::Kyc => "kyc",
        }
    }

    /// Prefix used by action references attached to published reviews.
    #[must_use]
    pub const fn callback_prefix(self) -> &'static str {
        match self {
            Self::Deposit => "dep",
            Self::Kyc => "kyc",
        }
    }

    /// Attachment name used when the item carries none.
    #[must_use]
    pub const fn default_file_name(self) -> &'static str {
        match self {
            Self::Deposit => "deposit-proof.bin",
            Self::Kyc => "kyc-proof.bin",
        }
    }

    /// Parses a kind name as written by producers.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deposit" | "real_deposit" | "dep" => Some(Self::Deposit),
            "kyc" => Some(Self::Kyc),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a review item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewItemId(String);

impl ReviewItemId {
    /// Wraps an identifier, trimming surrounding whitespace.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.len() == raw.len() {
            Self(raw)
        } else {
            Self(trimmed.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an empty id.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReviewItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReviewItemId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Identifier of a messaging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(i64);

impl ChannelId {
    /// Wraps a raw platform id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw platform id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Parses a configured channel id. Blank, malformed and zero values mean
    /// "not configured".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<i64>() {
            Ok(0) | Err(_) => None,
            Ok(v) => Some(Self(v)),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a reviewer (moderator) on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(i64);

impl ReviewerId {
    /// Wraps a raw platform id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw platform id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Platform identities are strictly positive.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a review was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the review was posted to.
    pub channel: ChannelId,
    /// Platform message id.
    pub message_id: i64,
}

/// Binary evidence attached to a review item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name, if the producer kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Raw file contents.
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Named attachment.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            bytes,
        }
    }

    /// True when there is nothing to publish.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A pending review work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Unique item id.
    pub id: ReviewItemId,
    /// Review kind.
    pub kind: ReviewKind,
    /// Creation time; the dispatch order key.
    pub created_at: DateTime<Utc>,
    /// Ledger ticket number; non-positive when the producer assigned none.
    pub ticket_seed: i64,
    /// Set by the store when the item is claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_target: Option<MessageRef>,
    /// Evidence to publish; empty means not yet publishable.
    #[serde(default)]
    pub attachment: Attachment,
    /// Opaque business fields, forwarded to the channel as-is.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ReviewItem {
    /// Creates an unclaimed item with an empty payload.
    #[must_use]
    pub fn new(id: impl Into<ReviewItemId>, kind: ReviewKind, created_at: DateTime<Utc>, ticket_seed: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            created_at,
            ticket_seed,
            dispatch_target: None,
            attachment: Attachment::default(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Replaces the attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    /// Replaces the opaque metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// True once the store recorded a dispatch target.
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.dispatch_target.is_some()
    }

    /// Seconds the item has been waiting, clamped at zero for clock skew.
    #[must_use]
    pub fn lag_seconds(&self, now: DateTime<Utc>) -> f64 {
        let lag = now.signed_duration_since(self.created_at);
        #[allow(clippy::cast_precision_loss)]
        let secs = lag.num_milliseconds() as f64 / 1000.0;
        secs.max(0.0)
    }
}

/// A moderator decision on a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    /// Accept the item.
    Approve,
    /// Reject the item.
    Reject,
}

impl ReviewAction {
    /// Wire name used in action references.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    /// Parses a wire name, ignoring case.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer identity to "allowed in the review channel".
///
/// Ordered so that membership operations are applied deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerRightsSnapshot(BTreeMap<ReviewerId, bool>);

impl ReviewerRightsSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the right of `identity`, returning the old value.
    pub fn insert(&mut self, identity: ReviewerId, allowed: bool) -> Option<bool> {
        self.0.insert(identity, allowed)
    }

    /// Forgets `identity`.
    pub fn remove(&mut self, identity: ReviewerId) -> Option<bool> {
        self.0.remove(&identity)
    }

    /// Right of `identity`, if tracked.
    #[must_use]
    pub fn get(&self, identity: ReviewerId) -> Option<bool> {
        self.0.get(&identity).copied()
    }

    /// Whether `identity` is tracked.
    #[must_use]
    pub fn contains(&self, identity: ReviewerId) -> bool {
        self.0.contains_key(&identity)
    }

    /// Whether `identity` is tracked and allowed.
    #[must_use]
    pub fn is_allowed(&self, identity: ReviewerId) -> bool {
        self.get(identity).unwrap_or(false)
    }

    /// Number of tracked identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tracked identities with their rights.
    pub fn iter(&self) -> impl Iterator<Item = (ReviewerId, bool)> + '_ {
        self.0.iter().map(|(id, allowed)| (*id, *allowed))
    }

    /// Tracked identities.
    pub fn identities(&self) -> impl Iterator<Item = ReviewerId> + '_ {
        self.0.keys().copied()
    }

    /// Drops the super reviewer and invalid identities; they are never tracked.
    #[must_use]
    pub fn without(mut self, super_reviewer: Option<ReviewerId>) -> Self {
        self.0
            .retain(|id, _| id.is_valid() && Some(*id) != super_reviewer);
        self
    }
}

impl FromIterator<(ReviewerId, bool)> for ReviewerRightsSnapshot {
    fn from_iter<T: IntoIterator<Item = (ReviewerId, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
