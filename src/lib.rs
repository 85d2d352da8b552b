//! # review-relay - Review dispatch and access reconciliation
//!
//! Moves pending deposit and KYC review items from a backing store to
//! moderator channels, claiming each one at most once, and keeps reviewer
//! membership of the review channel in line with their rights.
//!
//! ## Core Concepts
//!
//! - **Claim**: the atomic unclaimed-to-claimed transition of a review item
//! - **Dispatch pass**: fetch, publish and claim of a bounded batch per kind
//! - **Reconciliation pass**: diff of reviewer rights against the last applied
//!   snapshot, applied as revoke/restore membership calls
//! - **Wake signal**: edge-triggered flag; many notifications, one pass
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use review_relay::{InMemoryReviewStore, RecordingChannel, RelayConfig, ReviewRelay};
//!
//! let store = Arc::new(InMemoryReviewStore::default());
//! let relay = ReviewRelay::start(
//!     RelayConfig::from_env()?,
//!     store.clone(),
//!     store.clone(),
//!     Arc::new(RecordingChannel::new()),
//! )
//! .await?;
//!
//! let health = relay.health().snapshot();
//! relay.shutdown().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod review;
pub mod ticket;

// Collaborators
pub mod channel;
pub mod storage;

// Loops and their plumbing
pub mod access;
pub mod decision;
pub mod dispatch;
pub mod health;
pub mod notify;
pub mod observability;
pub mod runtime;
pub mod signal;

pub use access::{AccessHandle, AccessPlan, AccessReconciler, AccessReport, JoinDecision};
pub use channel::{ChannelApi, MembershipOp, RecordingChannel};
pub use config::RelayConfig;
pub use decision::{DecisionApi, DecisionGateway, DecisionOutcome, HttpDecisionApi};
pub use dispatch::{DispatchReport, DispatchScheduler, OutboundReview, ReviewCallback};
pub use error::{ChannelError, ConfigError, DecisionError, RelayError, RelayResult, StoreError};
pub use health::{HealthMonitor, HealthSnapshot};
pub use notify::{NotificationListener, NotifyMessage};
pub use review::{
    Attachment, ChannelId, MessageRef, ReviewAction, ReviewItem, ReviewItemId, ReviewKind, ReviewerId,
    ReviewerRightsSnapshot,
};
pub use runtime::ReviewRelay;
pub use signal::{Shutdown, ShutdownSignal, WakeSignal};
pub use storage::{InMemoryReviewStore, NotificationSource, ReviewStore};
pub use ticket::TicketCoder;
