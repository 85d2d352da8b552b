use std::sync::Arc;
use std::time::Duration;

use review_relay::access::REVOKE_REASON;
use review_relay::health::health_state;
use review_relay::{
    AccessReconciler, ChannelApi, ChannelError, ChannelId, InMemoryReviewStore, JoinDecision, MembershipOp,
    RecordingChannel, RelayConfig, ReviewKind, ReviewRelay, ReviewStore, ReviewerId,
};

const CHAT: ChannelId = ChannelId::new(-100_500);
const A: ReviewerId = ReviewerId::new(11);
const B: ReviewerId = ReviewerId::new(12);
const C: ReviewerId = ReviewerId::new(13);
const OWNER: ReviewerId = ReviewerId::new(1);

fn store_with_chat() -> Arc<InMemoryReviewStore> {
    let store = Arc::new(InMemoryReviewStore::default());
    store.set_channel(ReviewKind::Deposit, Some(CHAT)).unwrap();
    store
}

fn reconciler(store: &Arc<InMemoryReviewStore>, api: &Arc<RecordingChannel>) -> AccessReconciler {
    let (_monitor, writers) = health_state("review_dispatch");
    AccessReconciler::new(
        store.clone() as Arc<dyn ReviewStore>,
        api.clone() as Arc<dyn ChannelApi>,
        Some(OWNER),
        writers.access,
    )
}

#[tokio::test]
async fn incremental_pass_applies_only_the_delta() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    store.set_right(ReviewKind::Deposit, A, true).unwrap();
    store.set_right(ReviewKind::Deposit, B, false).unwrap();

    let mut r = reconciler(&store, &api);
    let first = r.sync_once().await.unwrap();
    assert!(first.full_scan);
    assert_eq!(first.restored, vec![A]);
    assert_eq!(first.revoked, vec![B]);
    api.reset().unwrap();

    store.set_right(ReviewKind::Deposit, A, false).unwrap();
    store.set_right(ReviewKind::Deposit, B, true).unwrap();
    store.set_right(ReviewKind::Deposit, C, true).unwrap();

    let second = r.sync_once().await.unwrap();
    assert!(!second.full_scan);
    assert_eq!(second.revoked, vec![A]);
    assert_eq!(second.restored, vec![B, C]);
    assert!(second.failed.is_empty());

    // Revokes go first, as temporary removals.
    assert_eq!(
        api.membership().unwrap(),
        vec![
            MembershipOp::Removed {
                channel: CHAT,
                identity: A,
                reason: REVOKE_REASON.to_string(),
            },
            MembershipOp::Unblocked { channel: CHAT, identity: B },
            MembershipOp::Unblocked { channel: CHAT, identity: C },
        ]
    );

    api.reset().unwrap();
    let third = r.sync_once().await.unwrap();
    assert!(third.revoked.is_empty() && third.restored.is_empty());
    assert!(api.membership().unwrap().is_empty());
}

#[tokio::test]
async fn channel_change_recomputes_from_scratch() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    store.set_right(ReviewKind::Deposit, A, true).unwrap();
    store.set_right(ReviewKind::Deposit, B, false).unwrap();

    let mut r = reconciler(&store, &api);
    r.sync_once().await.unwrap();
    api.reset().unwrap();

    let moved = ChannelId::new(-100_600);
    store.set_channel(ReviewKind::Deposit, Some(moved)).unwrap();
    let report = r.sync_once().await.unwrap();
    assert!(report.full_scan);
    assert_eq!(report.channel, Some(moved));
    assert_eq!(report.restored, vec![A]);
    assert_eq!(report.revoked, vec![B]);
    assert!(api
        .membership()
        .unwrap()
        .iter()
        .all(|op| matches!(op, MembershipOp::Removed { channel, .. } | MembershipOp::Unblocked { channel, .. } if *channel == moved)));
}

#[tokio::test]
async fn demoted_admin_is_removed() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    store.set_right(ReviewKind::Deposit, A, true).unwrap();
    store.set_right(ReviewKind::Deposit, B, true).unwrap();

    let mut r = reconciler(&store, &api);
    r.sync_once().await.unwrap();

    store.remove_admin(ReviewKind::Deposit, B).unwrap();
    let report = r.sync_once().await.unwrap();
    assert_eq!(report.revoked, vec![B]);
    assert!(report.restored.is_empty());
    assert!(!r.previous().0.contains(B));
}

#[tokio::test]
async fn owner_is_never_revoked() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    store.set_right(ReviewKind::Deposit, OWNER, false).unwrap();
    store.set_right(ReviewKind::Deposit, A, false).unwrap();

    let mut r = reconciler(&store, &api);
    let report = r.sync_once().await.unwrap();
    assert_eq!(report.revoked, vec![A]);
    assert!(api.membership().unwrap().iter().all(|op| op.identity() != OWNER));
}

#[tokio::test]
async fn membership_errors_are_isolated() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    for id in [A, B, C] {
        store.set_right(ReviewKind::Deposit, id, false).unwrap();
    }
    api.fail_member(A, || ChannelError::Api("Bad Request: not enough rights to restrict/unrestrict chat member".to_string()))
        .unwrap();
    api.fail_member(B, || ChannelError::RateLimited { retry_after_secs: 5 }).unwrap();

    let (monitor, writers) = health_state("review_dispatch");
    let mut r = AccessReconciler::new(store.clone(), api.clone(), None, writers.access);
    let report = r.tick().await.unwrap();

    assert_eq!(report.revoked, vec![C]);
    assert_eq!(report.failed, vec![A, B]);
    let access = monitor.access();
    assert_eq!(access.last_revoked, 1);
    assert_eq!(access.last_failed, 2);
    assert!(access.last_full_scan);
    assert!(access.last_error.is_none());

    // The snapshot advanced anyway: nothing is retried next pass.
    api.reset().unwrap();
    let report = r.tick().await.unwrap();
    assert!(report.failed.is_empty() && report.revoked.is_empty());
}

#[tokio::test]
async fn unset_channel_clears_access_state() {
    let api = Arc::new(RecordingChannel::new());
    let store = store_with_chat();
    let (monitor, writers) = health_state("review_dispatch");
    let mut r = AccessReconciler::new(store.clone(), api, None, writers.access);

    r.tick().await.unwrap();
    assert_eq!(monitor.access().channel, Some(CHAT));

    store.set_channel(ReviewKind::Deposit, None).unwrap();
    let report = r.tick().await.unwrap();
    assert_eq!(report.channel, None);
    assert_eq!(monitor.access().channel, None);
    assert_eq!(monitor.access().passes, 2);
}

#[tokio::test]
async fn relay_serves_join_requests_and_syncs() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    store.set_right(ReviewKind::Deposit, A, true).unwrap();

    let config = RelayConfig {
        super_reviewer: Some(OWNER),
        ..RelayConfig::default()
    };
    let relay = ReviewRelay::start(config, store.clone(), store.clone(), api.clone())
        .await
        .unwrap();
    // The startup pass already ran.
    assert_eq!(relay.health().access().passes, 1);
    assert_eq!(relay.health().access().last_restored, 1);

    let access = relay.access();
    assert_eq!(access.join_request(CHAT, A).await.unwrap(), JoinDecision::Approved);
    assert_eq!(access.join_request(CHAT, B).await.unwrap(), JoinDecision::Declined);
    assert_eq!(access.join_request(CHAT, OWNER).await.unwrap(), JoinDecision::Approved);
    assert_eq!(
        access.join_request(ChannelId::new(-7), A).await.unwrap(),
        JoinDecision::Ignored
    );

    // B holds no rights entry, so the decline is not tracked and granting
    // the right restores B on the next pass.
    store.set_right(ReviewKind::Deposit, B, true).unwrap();
    api.reset().unwrap();
    let report = access.sync_now().await.unwrap();
    assert_eq!(report.restored, vec![B]);
    assert!(!report.full_scan);

    relay.shutdown().await;
    assert!(access.sync_now().await.is_err());
}

#[tokio::test]
async fn access_sync_notification_triggers_a_pass() {
    let store = store_with_chat();
    let api = Arc::new(RecordingChannel::new());
    let relay = ReviewRelay::start(RelayConfig::default(), store.clone(), store.clone(), api.clone())
        .await
        .unwrap();

    let mut listener = relay.health().listener_updates();
    let _ = tokio::time::timeout(Duration::from_secs(5), listener.wait_for(|h| h.connected))
        .await
        .unwrap()
        .unwrap();

    let mut access = relay.health().access_updates();
    // Connect catch-up pass.
    let _ = tokio::time::timeout(Duration::from_secs(5), access.wait_for(|h| h.passes >= 2))
        .await
        .unwrap()
        .unwrap();

    store.set_right(ReviewKind::Deposit, A, false).unwrap();
    store.notify_access_sync("rights_changed").unwrap();

    let _ = tokio::time::timeout(Duration::from_secs(5), access.wait_for(|h| h.last_revoked == 1))
        .await
        .unwrap()
        .unwrap();
    assert!(api
        .membership()
        .unwrap()
        .contains(&MembershipOp::Removed {
            channel: CHAT,
            identity: A,
            reason: REVOKE_REASON.to_string(),
        }));

    relay.shutdown().await;
}
