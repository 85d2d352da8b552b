use serde::{Deserialize, Serialize};

/// Reserved prefix of access-sync notifications. Producers must honor it.
pub const ACCESS_SYNC_PREFIX: &str = "access_sync:";

/// Classification of a received notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMessage {
    /// Pending review items may have changed.
    Dispatch,
    /// Reviewer rights or the review channel may have changed.
    AccessSync,
}

impl NotifyMessage {
    /// Classifies a payload. The prefix match ignores case and surrounding
    /// whitespace.
    #[must_use]
    pub fn classify(payload: &str) -> Self {
        let trimmed = payload.trim_start();
        let is_access = trimmed
            .get(..ACCESS_SYNC_PREFIX.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(ACCESS_SYNC_PREFIX));
        if is_access {
            Self::AccessSync
        } else {
            Self::Dispatch
        }
    }
}

/// Producer-side dispatch payload, `"{kind}:{request_id}"`.
///
/// Returns `None` for a blank request id; such items are never announced.
#[must_use]
pub fn dispatch_payload(kind: &str, request_id: &str) -> Option<String> {
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return None;
    }
    let kind = kind.trim().to_lowercase();
    let kind = if kind.is_empty() { "unknown" } else { kind.as_str() };
    Some(format!("{kind}:{request_id}"))
}

/// Producer-side access-sync payload.
#[must_use]
pub fn access_sync_payload(reason: &str) -> String {
    format!("{ACCESS_SYNC_PREFIX}{}", reason.trim())
}
