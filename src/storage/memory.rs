//! In-memory storage backend.
//!
//! Thread-safe implementation of the store traits, intended for embedded
//! usage, tests, and as a reference implementation. Producers enqueue items
//! through [`InMemoryReviewStore::enqueue`], which also publishes the dispatch
//! notification the way the ledger does inside its write transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::StoreError;
use crate::notify::{access_sync_payload, dispatch_payload};
use crate::review::{ChannelId, MessageRef, ReviewItem, ReviewItemId, ReviewKind, ReviewerId, ReviewerRightsSnapshot};
use crate::storage::traits::{Notification, NotificationSource, ReviewStore, Subscription};

type Subscriber = mpsc::UnboundedSender<Result<Notification, StoreError>>;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct StoreState {
    items: HashMap<ReviewItemId, ReviewItem>,
    channels: HashMap<ReviewKind, ChannelId>,
    rights: HashMap<ReviewKind, ReviewerRightsSnapshot>,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Subscribe,
    Fetch,
}

#[derive(Debug, Default)]
struct Faults {
    failing_subscribes: usize,
    failing_fetches: usize,
}

/// In-memory review store and notification bus.
#[derive(Debug)]
pub struct InMemoryReviewStore {
    notify_channel: String,
    state: Mutex<StoreState>,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    faults: Mutex<Faults>,
    claim_attempts: AtomicU64,
    subscribe_attempts: AtomicU64,
}

impl InMemoryReviewStore {
    /// Creates an empty store whose producers publish on `notify_channel`.
    #[must_use]
    pub fn new(notify_channel: impl Into<String>) -> Self {
        Self {
            notify_channel: notify_channel.into(),
            state: Mutex::new(StoreState::default()),
            subscribers: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            claim_attempts: AtomicU64::new(0),
            subscribe_attempts: AtomicU64::new(0),
        }
    }

    /// Inserts an item without notifying anyone.
    pub fn insert_item(&self, item: ReviewItem) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_err("insert_item"))?;
        state.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Inserts an item and publishes its dispatch notification.
    pub fn enqueue(&self, item: ReviewItem) -> Result<(), StoreError> {
        let payload = dispatch_payload(item.kind.ticket_tag(), item.id.as_str());
        self.insert_item(item)?;
        if let Some(payload) = payload {
            self.publish(&self.notify_channel, &payload)?;
        }
        Ok(())
    }

    /// Returns a copy of an item.
    pub fn get(&self, id: &ReviewItemId) -> Result<Option<ReviewItem>, StoreError> {
        let state = self.state.lock().map_err(|_| lock_err("get"))?;
        Ok(state.items.get(id).cloned())
    }

    /// Sets or clears the destination channel for `kind`.
    pub fn set_channel(&self, kind: ReviewKind, channel: Option<ChannelId>) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_err("set_channel"))?;
        match channel {
            Some(channel) => {
                state.channels.insert(kind, channel);
            }
            None => {
                state.channels.remove(&kind);
            }
        }
        Ok(())
    }

    /// Grants or revokes the review right for one identity.
    pub fn set_right(&self, kind: ReviewKind, identity: ReviewerId, allowed: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_err("set_right"))?;
        state.rights.entry(kind).or_default().insert(identity, allowed);
        Ok(())
    }

    /// Removes an identity from the admin set entirely.
    pub fn remove_admin(&self, kind: ReviewKind, identity: ReviewerId) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_err("remove_admin"))?;
        if let Some(rights) = state.rights.get_mut(&kind) {
            rights.remove(identity);
        }
        Ok(())
    }

    /// Replaces the whole rights table for `kind`.
    pub fn set_rights(&self, kind: ReviewKind, rights: ReviewerRightsSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_err("set_rights"))?;
        state.rights.insert(kind, rights);
        Ok(())
    }

    /// Publishes an access-sync notification.
    pub fn notify_access_sync(&self, reason: &str) -> Result<(), StoreError> {
        self.publish(&self.notify_channel, &access_sync_payload(reason))
    }

    /// Publishes a raw payload to every live subscriber of `channel`.
    pub fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.lock().map_err(|_| lock_err("publish"))?;
        if let Some(list) = subscribers.get_mut(channel) {
            let msg = Notification {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            list.retain(|tx| tx.send(Ok(msg.clone())).is_ok());
        }
        Ok(())
    }

    /// Ends every live subscription, as a dropped database connection would.
    pub fn drop_subscriptions(&self) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.lock().map_err(|_| lock_err("drop_subscriptions"))?;
        subscribers.clear();
        Ok(())
    }

    /// Fails every live subscription with a connection error.
    pub fn break_subscriptions(&self, reason: &str) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.lock().map_err(|_| lock_err("break_subscriptions"))?;
        for tx in subscribers.values().flatten() {
            let _ = tx.send(Err(StoreError::Connection(reason.to_string())));
        }
        subscribers.clear();
        Ok(())
    }

    /// Makes the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: usize) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| lock_err("fail_next_subscribes"))?;
        faults.failing_subscribes = n;
        Ok(())
    }

    /// Makes the next `n` fetch calls fail.
    pub fn fail_next_fetches(&self, n: usize) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| lock_err("fail_next_fetches"))?;
        faults.failing_fetches = n;
        Ok(())
    }

    /// Number of live subscriptions on `channel`.
    pub fn live_subscriptions(&self, channel: &str) -> Result<usize, StoreError> {
        let subscribers = self.subscribers.lock().map_err(|_| lock_err("live_subscriptions"))?;
        Ok(subscribers
            .get(channel)
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count()))
    }

    /// Number of claim calls so far.
    #[must_use]
    pub fn claim_attempts(&self) -> u64 {
        self.claim_attempts.load(Ordering::Relaxed)
    }

    /// Number of subscribe calls so far.
    #[must_use]
    pub fn subscribe_attempts(&self) -> u64 {
        self.subscribe_attempts.load(Ordering::Relaxed)
    }

    fn take_fault(&self, fault: Fault) -> Result<bool, StoreError> {
        let mut faults = self.faults.lock().map_err(|_| lock_err("faults"))?;
        let remaining = match fault {
            Fault::Subscribe => &mut faults.failing_subscribes,
            Fault::Fetch => &mut faults.failing_fetches,
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Default for InMemoryReviewStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NOTIFY_CHANNEL)
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn fetch_pending(&self, kind: ReviewKind, limit: usize) -> Result<Vec<ReviewItem>, StoreError> {
        if self.take_fault(Fault::Fetch)? {
            return Err(StoreError::Connection("injected fetch failure".to_string()));
        }
        let state = self.state.lock().map_err(|_| lock_err("fetch_pending"))?;
        let mut pending: Vec<&ReviewItem> = state
            .items
            .values()
            .filter(|item| item.kind == kind && !item.is_claimed())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending.into_iter().take(limit.max(1)).cloned().collect())
    }

    async fn claim(&self, kind: ReviewKind, id: &ReviewItemId, target: MessageRef) -> Result<bool, StoreError> {
        self.claim_attempts.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().map_err(|_| lock_err("claim"))?;
        match state.items.get_mut(id) {
            Some(item) if item.kind == kind && item.dispatch_target.is_none() => {
                item.dispatch_target = Some(target);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn resolve_channel(&self, kind: ReviewKind) -> Result<Option<ChannelId>, StoreError> {
        let state = self.state.lock().map_err(|_| lock_err("resolve_channel"))?;
        Ok(state.channels.get(&kind).copied())
    }

    async fn current_snapshot(&self, kind: ReviewKind) -> Result<ReviewerRightsSnapshot, StoreError> {
        let state = self.state.lock().map_err(|_| lock_err("current_snapshot"))?;
        Ok(state.rights.get(&kind).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl NotificationSource for InMemoryReviewStore {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.subscribe_attempts.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(Fault::Subscribe)? {
            return Err(StoreError::Connection("injected subscribe failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().map_err(|_| lock_err("subscribe"))?;
        subscribers.entry(channel.to_string()).or_default().push(tx);
        Ok(Subscription::new(channel, Box::pin(UnboundedReceiverStream::new(rx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tokio_stream::StreamExt;

    fn target() -> MessageRef {
        MessageRef {
            channel: ChannelId::new(-1),
            message_id: 1,
        }
    }

    #[tokio::test]
    async fn fetch_is_oldest_first_and_bounded() {
        let store = InMemoryReviewStore::default();
        let t0 = Utc::now();
        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            let offset = Duration::seconds(10 - i64::try_from(i).unwrap());
            store
                .insert_item(ReviewItem::new(*id, ReviewKind::Deposit, t0 - offset, 1))
                .unwrap();
        }
        store.insert_item(ReviewItem::new("k", ReviewKind::Kyc, t0, 1)).unwrap();

        let pending = store.fetch_pending(ReviewKind::Deposit, 2).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let store = InMemoryReviewStore::default();
        store
            .insert_item(ReviewItem::new("r1", ReviewKind::Kyc, Utc::now(), 1))
            .unwrap();
        let id = ReviewItemId::new("r1");

        assert!(store.claim(ReviewKind::Kyc, &id, target()).await.unwrap());
        assert!(!store.claim(ReviewKind::Kyc, &id, target()).await.unwrap());
        assert!(!store.claim(ReviewKind::Kyc, &ReviewItemId::new("missing"), target()).await.unwrap());
        assert!(store.fetch_pending(ReviewKind::Kyc, 10).await.unwrap().is_empty());
        assert_eq!(store.claim_attempts(), 3);
    }

    #[tokio::test]
    async fn claim_with_wrong_kind_fails() {
        let store = InMemoryReviewStore::default();
        store
            .insert_item(ReviewItem::new("r1", ReviewKind::Kyc, Utc::now(), 1))
            .unwrap();
        assert!(!store.claim(ReviewKind::Deposit, &ReviewItemId::new("r1"), target()).await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_notifies_subscribers() {
        let store = InMemoryReviewStore::new("reviews");
        let mut sub = store.subscribe("reviews").await.unwrap();
        store
            .enqueue(ReviewItem::new("r1", ReviewKind::Deposit, Utc::now(), 1))
            .unwrap();
        store.notify_access_sync("rights_changed").unwrap();

        let first = sub.messages().next().await.unwrap().unwrap();
        assert_eq!(first.payload, "real_deposit:r1");
        let second = sub.messages().next().await.unwrap().unwrap();
        assert_eq!(second.payload, "access_sync:rights_changed");
    }

    #[tokio::test]
    async fn dropped_subscriptions_end_their_streams() {
        let store = InMemoryReviewStore::new("reviews");
        let mut sub = store.subscribe("reviews").await.unwrap();
        assert_eq!(store.live_subscriptions("reviews").unwrap(), 1);
        store.drop_subscriptions().unwrap();
        assert!(sub.messages().next().await.is_none());
        assert_eq!(store.live_subscriptions("reviews").unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = InMemoryReviewStore::default();
        store.fail_next_subscribes(1).unwrap();
        assert!(store.subscribe("review_dispatch").await.is_err());
        assert!(store.subscribe("review_dispatch").await.is_ok());

        store.fail_next_fetches(1).unwrap();
        assert!(store.fetch_pending(ReviewKind::Kyc, 1).await.is_err());
        assert!(store.fetch_pending(ReviewKind::Kyc, 1).await.is_ok());
    }

    #[tokio::test]
    async fn reviewer_allowed_reads_rights() {
        let store = InMemoryReviewStore::default();
        store.set_right(ReviewKind::Deposit, ReviewerId::new(5), true).unwrap();
        store.set_right(ReviewKind::Deposit, ReviewerId::new(6), false).unwrap();
        assert!(store.is_reviewer_allowed(ReviewKind::Deposit, ReviewerId::new(5)).await.unwrap());
        assert!(!store.is_reviewer_allowed(ReviewKind::Deposit, ReviewerId::new(6)).await.unwrap());
        assert!(!store.is_reviewer_allowed(ReviewKind::Kyc, ReviewerId::new(5)).await.unwrap());
    }
}
