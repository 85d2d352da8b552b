use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use review_relay::health::{health_state, HealthMonitor, ListenerHealth};
use review_relay::{InMemoryReviewStore, NotificationListener, ReviewItem, ReviewKind, Shutdown, WakeSignal};

const CHANNEL: &str = "review_dispatch";

struct Running {
    store: Arc<InMemoryReviewStore>,
    dispatch: Arc<WakeSignal>,
    access: Arc<WakeSignal>,
    monitor: HealthMonitor,
    shutdown: Shutdown,
    task: tokio::task::JoinHandle<()>,
}

fn spawn_listener(store: Arc<InMemoryReviewStore>) -> Running {
    let dispatch = Arc::new(WakeSignal::new());
    let access = Arc::new(WakeSignal::new());
    let (monitor, writers) = health_state(CHANNEL);
    let shutdown = Shutdown::new();
    let listener = NotificationListener::new(
        store.clone(),
        CHANNEL,
        Duration::from_secs(3),
        dispatch.clone(),
        access.clone(),
        writers.listener,
    );
    let task = tokio::spawn(listener.run(shutdown.signal()));
    Running {
        store,
        dispatch,
        access,
        monitor,
        shutdown,
        task,
    }
}

async fn wait_listener(rx: &mut watch::Receiver<ListenerHealth>, done: impl FnMut(&ListenerHealth) -> bool) {
    let _ = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(done))
        .await
        .expect("listener state not reached")
        .expect("listener health writer dropped");
}

impl Running {
    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_raises_both_signals_exactly_once() {
    let running = spawn_listener(Arc::new(InMemoryReviewStore::new(CHANNEL)));
    let mut updates = running.monitor.listener_updates();

    wait_listener(&mut updates, |h| h.connected && h.connects == 1).await;
    assert_eq!(running.dispatch.raise_count(), 1);
    assert_eq!(running.access.raise_count(), 1);

    running.store.drop_subscriptions().unwrap();
    wait_listener(&mut updates, |h| !h.connected).await;
    assert_eq!(updates.borrow().last_error.as_deref(), Some("listener_lost"));

    wait_listener(&mut updates, |h| h.connected && h.connects == 2).await;
    assert_eq!(running.dispatch.raise_count(), 2);
    assert_eq!(running.access.raise_count(), 2);
    assert!(running.monitor.listener().last_error.is_none());
    assert_eq!(running.store.live_subscriptions(CHANNEL).unwrap(), 1);

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn broken_subscription_is_replaced() {
    let running = spawn_listener(Arc::new(InMemoryReviewStore::new(CHANNEL)));
    let mut updates = running.monitor.listener_updates();
    wait_listener(&mut updates, |h| h.connected).await;

    running.store.break_subscriptions("server closed the connection").unwrap();
    wait_listener(&mut updates, |h| !h.connected).await;
    assert!(updates.borrow().last_error_at.is_some());

    wait_listener(&mut updates, |h| h.connects == 2).await;
    assert_eq!(running.store.subscribe_attempts(), 2);

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connect_failures_are_retried_after_backoff() {
    let store = Arc::new(InMemoryReviewStore::new(CHANNEL));
    store.fail_next_subscribes(2).unwrap();
    let started = tokio::time::Instant::now();

    let running = spawn_listener(store);
    let mut updates = running.monitor.listener_updates();
    wait_listener(&mut updates, |h| h.connected).await;

    assert_eq!(running.store.subscribe_attempts(), 3);
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(running.dispatch.raise_count(), 1);

    running.stop().await;
}

#[tokio::test]
async fn messages_raise_the_matching_signal() {
    let running = spawn_listener(Arc::new(InMemoryReviewStore::new(CHANNEL)));
    let mut updates = running.monitor.listener_updates();
    wait_listener(&mut updates, |h| h.connected).await;

    running.store.notify_access_sync("rights_changed").unwrap();
    wait_listener(&mut updates, |h| {
        h.last_notify_payload.as_deref() == Some("access_sync:rights_changed")
    })
    .await;
    assert_eq!(running.access.raise_count(), 2);
    assert_eq!(running.dispatch.raise_count(), 1);

    running
        .store
        .enqueue(ReviewItem::new("k-1", ReviewKind::Kyc, Utc::now(), 0))
        .unwrap();
    wait_listener(&mut updates, |h| h.last_notify_payload.as_deref() == Some("kyc:k-1")).await;
    assert_eq!(running.dispatch.raise_count(), 2);
    assert_eq!(running.access.raise_count(), 2);

    running.store.publish(CHANNEL, "  ACCESS_SYNC:manual  ").unwrap();
    wait_listener(&mut updates, |h| h.last_notify_payload.as_deref() == Some("ACCESS_SYNC:manual")).await;
    assert_eq!(running.access.raise_count(), 3);

    running.stop().await;
}

#[tokio::test]
async fn hostile_payload_is_truncated_in_health() {
    let running = spawn_listener(Arc::new(InMemoryReviewStore::new(CHANNEL)));
    let mut updates = running.monitor.listener_updates();
    wait_listener(&mut updates, |h| h.connected).await;

    running.store.publish(CHANNEL, &"x".repeat(10_000)).unwrap();
    wait_listener(&mut updates, |h| h.last_notify_at.is_some()).await;
    assert_eq!(
        running.monitor.listener().last_notify_payload.unwrap().len(),
        review_relay::health::NOTIFY_PAYLOAD_LIMIT
    );

    running.stop().await;
}

#[tokio::test]
async fn other_channels_are_not_heard() {
    let running = spawn_listener(Arc::new(InMemoryReviewStore::new(CHANNEL)));
    let mut updates = running.monitor.listener_updates();
    wait_listener(&mut updates, |h| h.connected).await;

    running.store.publish("somewhere_else", "kyc:k-1").unwrap();
    running.store.publish(CHANNEL, "deposit:d-1").unwrap();
    wait_listener(&mut updates, |h| h.last_notify_payload.is_some()).await;
    assert_eq!(updates.borrow().last_notify_payload.as_deref(), Some("deposit:d-1"));

    running.stop().await;
}
