//! Review decisions.
//!
//! A moderator pressing approve or reject on a published review produces a
//! callback reference. The gateway checks where it came from and who pressed
//! it, then forwards the decision to the remote decision API. The outcome is
//! opaque apart from its `status` and `ticket` fields.

mod gateway;
mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::DecisionError;
use crate::review::{ReviewAction, ReviewItemId, ReviewKind, ReviewerId};

pub use gateway::DecisionGateway;
pub use http::{HttpDecisionApi, DECISION_TOKEN_HEADER};

/// Outcome returned by the decision API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOutcome {
    /// Outcome status as reported, e.g. `approved`, `rejected_final`.
    pub status: String,
    /// Ticket code echoed back by the API, if any.
    pub ticket: Option<String>,
    /// The full response body.
    pub payload: Value,
}

impl DecisionOutcome {
    /// Builds an outcome from a response body. Non-object bodies are kept
    /// as payload with an empty status.
    #[must_use]
    pub fn from_payload(payload: Value) -> Self {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            status: text("status").unwrap_or_default(),
            ticket: text("ticket"),
            payload,
        }
    }

    /// Status is `rejected`.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status.to_ascii_lowercase().starts_with("rejected")
    }

    /// Status is `approved`.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status.to_ascii_lowercase().starts_with("approved")
    }
}

/// Remote decision API.
#[async_trait]
pub trait DecisionApi: Send + Sync {
    /// Applies `action` to the item on behalf of `reviewer`.
    async fn decide(
        &self,
        kind: ReviewKind,
        item_id: &ReviewItemId,
        action: ReviewAction,
        reviewer: ReviewerId,
    ) -> Result<DecisionOutcome, DecisionError>;
}
