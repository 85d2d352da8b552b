//! Pub/sub notifications: the payload contract and the listener.
//!
//! Producers publish on a single channel. Payloads starting with
//! [`ACCESS_SYNC_PREFIX`] request an access reconciliation; anything else is a
//! dispatch trigger. Payload content beyond that prefix is informational only.

/// Subscription owner and signal router.
pub mod listener;
/// Payload encoding and classification.
pub mod payload;

pub use listener::{ListenerPhase, NotificationListener};
pub use payload::{access_sync_payload, dispatch_payload, NotifyMessage, ACCESS_SYNC_PREFIX};
