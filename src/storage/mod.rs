//! Backing store contracts and the in-memory backend.
//!
//! The relay never owns review data. It reads pending items, proposes the
//! unclaimed-to-claimed transition, reads reviewer rights and listens for
//! change notifications, all through the traits defined here.

mod memory;
mod traits;

pub use memory::InMemoryReviewStore;
pub use traits::{Notification, NotificationSource, NotificationStream, ReviewStore, Subscription, SubscriptionId};
