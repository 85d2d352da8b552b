//! What the relay hands to the channel for one review item.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DecisionError;
use crate::review::{ReviewAction, ReviewItem, ReviewItemId, ReviewKind};
use crate::ticket::TicketCoder;

/// Action reference attached to a published review.
///
/// Encoded as `{prefix}:{action}:{id}`, e.g. `dep:approve:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReviewCallback {
    /// Review kind, from the `dep`/`kyc` prefix.
    pub kind: ReviewKind,
    /// Requested decision.
    pub action: ReviewAction,
    /// Review item the decision applies to.
    pub item_id: ReviewItemId,
}

impl ReviewCallback {
    #[must_use]
    pub fn new(kind: ReviewKind, action: ReviewAction, item_id: ReviewItemId) -> Self {
        Self { kind, action, item_id }
    }

    /// Parses an action reference back into its parts.
    ///
    /// # Errors
    ///
    /// Returns `DecisionError::InvalidCallback` for unknown prefixes, unknown
    /// actions and blank ids.
    pub fn parse(raw: &str) -> Result<Self, DecisionError> {
        let invalid = || DecisionError::InvalidCallback { raw: raw.to_string() };
        let mut parts = raw.trim().splitn(3, ':');
        let (Some(prefix), Some(action), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let kind = ReviewKind::ALL
            .into_iter()
            .find(|k| k.callback_prefix() == prefix)
            .ok_or_else(invalid)?;
        let action = ReviewAction::parse(action).ok_or_else(invalid)?;
        let item_id = ReviewItemId::new(id);
        if item_id.is_blank() {
            return Err(invalid());
        }
        Ok(Self { kind, action, item_id })
    }
}

impl fmt::Display for ReviewCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.callback_prefix(), self.action, self.item_id)
    }
}

/// A review ready to be published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundReview {
    /// Review item id.
    pub item_id: ReviewItemId,
    /// Review kind.
    pub kind: ReviewKind,
    /// Human-readable ticket code.
    pub ticket: String,
    /// When the producer created the item.
    pub created_at: DateTime<Utc>,
    /// Attachment file name, never blank.
    pub file_name: String,
    /// Attachment bytes. Not serialized.
    #[serde(skip)]
    pub attachment: Vec<u8>,
    /// Business fields, passed through untouched for the caption renderer.
    pub metadata: serde_json::Value,
    /// Approve action reference.
    pub approve: ReviewCallback,
    /// Reject action reference.
    pub reject: ReviewCallback,
}

impl OutboundReview {
    /// Builds the outbound form of a pending item.
    #[must_use]
    pub fn from_item(item: &ReviewItem) -> Self {
        let file_name = item
            .attachment
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| item.kind.default_file_name())
            .to_string();

        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            ticket: TicketCoder::encode(item.kind, item.ticket_seed, item.id.as_str()),
            created_at: item.created_at,
            file_name,
            attachment: item.attachment.bytes.clone(),
            metadata: item.metadata.clone(),
            approve: ReviewCallback::new(item.kind, ReviewAction::Approve, item.id.clone()),
            reject: ReviewCallback::new(item.kind, ReviewAction::Reject, item.id.clone()),
        }
    }
}
