use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::dispatch::ReviewCallback;
use crate::error::{DecisionError, RelayResult};
use crate::review::{ChannelId, ReviewerId};
use crate::storage::ReviewStore;

use super::{DecisionApi, DecisionOutcome};

/// Validates review callbacks and forwards them to the decision API.
pub struct DecisionGateway {
    store: Arc<dyn ReviewStore>,
    api: Arc<dyn DecisionApi>,
    super_reviewer: Option<ReviewerId>,
    timeout: Duration,
}

impl DecisionGateway {
    /// Creates a gateway. `super_reviewer` may decide on every kind.
    pub fn new(
        store: Arc<dyn ReviewStore>,
        api: Arc<dyn DecisionApi>,
        super_reviewer: Option<ReviewerId>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            api,
            super_reviewer,
            timeout,
        }
    }

    /// Handles a callback pressed by `reviewer` on a message in `channel`.
    ///
    /// # Errors
    ///
    /// - `DecisionError::InvalidCallback` for malformed callback data.
    /// - `DecisionError::WrongChannel` if `channel` is not the configured
    ///   review channel for the callback's kind.
    /// - `DecisionError::NotAllowed` if the reviewer lacks the right.
    /// - `DecisionError::Timeout` if the remote call exceeds the timeout.
    /// - Store errors and remote API errors as returned.
    #[instrument(skip(self), level = "debug")]
    pub async fn handle(&self, callback: &str, channel: ChannelId, reviewer: ReviewerId) -> RelayResult<DecisionOutcome> {
        let callback = ReviewCallback::parse(callback)?;
        let kind = callback.kind;

        if self.store.resolve_channel(kind).await? != Some(channel) {
            return Err(DecisionError::WrongChannel { kind }.into());
        }

        let allowed = self.super_reviewer == Some(reviewer) || self.store.is_reviewer_allowed(kind, reviewer).await?;
        if !allowed {
            warn!(%kind, %reviewer, request = %callback.item_id, "Review decision from unauthorized reviewer");
            return Err(DecisionError::NotAllowed { reviewer, kind }.into());
        }

        let call = self.api.decide(kind, &callback.item_id, callback.action, reviewer);
        let outcome = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DecisionError::Timeout {
                duration_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        info!(
            %kind,
            %reviewer,
            request = %callback.item_id,
            action = %callback.action,
            status = %outcome.status,
            "Review decision applied"
        );
        Ok(outcome)
    }
}
