//! Error types for the review relay.
//!
//! Every collaborator boundary has its own strongly typed error so the loops
//! can tell transient infrastructure failures apart from race losses and
//! per-item problems. Nothing in this crate turns one of these into a panic.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::review::{ChannelId, ReviewKind, ReviewerId};

/// Errors raised by the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store connection error: {0}")]
    Connection(String),
}

/// Errors raised by the messaging channel API.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Member {identity} not found in channel {channel}")]
    MemberNotFound {
        channel: ChannelId,
        identity: ReviewerId,
    },

    #[error("Not enough rights in channel {channel}")]
    NotEnoughRights {
        channel: ChannelId,
    },

    #[error("Identity {identity} is not a participant of channel {channel}")]
    NotParticipant {
        channel: ChannelId,
        identity: ReviewerId,
    },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
    },

    #[error("Channel API error: {0}")]
    Api(String),
}

fn benign_membership_text() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)participant|not enough rights|user not found").ok())
        .as_ref()
}

impl ChannelError {
    /// Returns true for membership errors that reconciliation swallows.
    ///
    /// Raw API errors are classified by their text, since the channel API
    /// reports missing members and missing rights as generic bad requests.
    #[must_use]
    pub fn is_benign_membership_error(&self) -> bool {
        match self {
            Self::MemberNotFound { .. } | Self::NotEnoughRights { .. } | Self::NotParticipant { .. } => true,
            Self::RateLimited { .. } => false,
            Self::Api(text) => benign_membership_text().is_some_and(|re| re.is_match(text)),
        }
    }
}

/// Errors raised while routing a review decision.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Invalid callback data: {raw}")]
    InvalidCallback {
        raw: String,
    },

    #[error("Wrong {kind} review channel")]
    WrongChannel {
        kind: ReviewKind,
    },

    #[error("Reviewer {reviewer} is not allowed to review {kind}")]
    NotAllowed {
        reviewer: ReviewerId,
        kind: ReviewKind,
    },

    #[error("Decision API credentials are not configured")]
    MissingCredentials,

    #[error("Decision rejected (status {status}): {message}")]
    Rejected {
        status: u16,
        message: String,
    },

    #[error("Decision call timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Decision transport error: {0}")]
    Transport(String),

    #[error("Invalid decision response: {0}")]
    InvalidResponse(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        key: String,
        value: String,
    },

    #[error("Value for {key} must be at least {min}, got {actual}")]
    OutOfRange {
        key: String,
        min: u64,
        actual: u64,
    },
}

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl RelayError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns true if this is a channel error.
    #[must_use]
    pub const fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true for transient infrastructure failures that the loops retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => matches!(e, StoreError::Connection(_) | StoreError::Backend(_)),
            Self::Channel(e) => matches!(e, ChannelError::RateLimited { .. } | ChannelError::Api(_)),
            Self::Decision(e) => match e {
                DecisionError::Timeout { .. } | DecisionError::Transport(_) => true,
                DecisionError::Rejected { status, .. } => *status >= 500,
                _ => false,
            },
            Self::Config(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
