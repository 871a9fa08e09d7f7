//! Notification snapshot, realtime pushes and mark-read.

use super::harness::*;
use crate::SessionError;
use pulse_protocol_types::GatewayError;

async fn signed_in_with(records: Vec<pulse_protocol_types::NotificationRecord>) -> TestHarness {
    let h = TestHarness::started().await;
    h.backend.set_notifications(&ada(), records);
    h.manager.login(ADA_EMAIL, ADA_PASSWORD).await.unwrap();
    h
}

fn ids(snapshot: &crate::SessionSnapshot) -> Vec<&str> {
    snapshot.notifications.iter().map(|n| n.id.as_str()).collect()
}

#[tokio::test]
async fn test_push_prepends_and_counts() {
    let h = signed_in_with(vec![notification("n1", false)]).await;

    h.connector.push(notification("n2", false)).await;
    let snapshot = h.wait_for(|s| s.notifications.len() == 2).await;

    assert_eq!(ids(&snapshot), vec!["n2", "n1"]);
    assert_eq!(snapshot.unread_count, 2);
    assert_eq!(
        snapshot.notifications[0].message(),
        Some("Report n2 needs review")
    );
    assert_unread_invariant(&snapshot);
}

#[tokio::test]
async fn test_duplicate_push_counts_once() {
    let h = signed_in_with(vec![notification("n1", false)]).await;

    h.connector.push(notification("n2", false)).await;
    h.connector.push(notification("n2", false)).await;
    h.connector.push(notification("n1", false)).await;
    h.connector.push(notification("n3", false)).await;
    let snapshot = h.wait_for(|s| s.notifications.len() == 3).await;

    assert_eq!(ids(&snapshot), vec!["n3", "n2", "n1"]);
    assert_eq!(snapshot.unread_count, 3);
    assert_unread_invariant(&snapshot);
}

#[tokio::test]
async fn test_push_of_read_notification_keeps_unread_count() {
    let h = signed_in_with(vec![notification("n1", false)]).await;

    h.connector.push(notification("n2", true)).await;
    let snapshot = h.wait_for(|s| s.notifications.len() == 2).await;

    assert_eq!(snapshot.unread_count, 1);
    assert_unread_invariant(&snapshot);
}

#[tokio::test]
async fn test_mark_all_read() {
    let h = signed_in_with(vec![
        notification("a", false),
        notification("b", false),
        notification("c", true),
    ])
    .await;
    assert_eq!(h.manager.snapshot().unread_count, 2);

    let snapshot = h.manager.mark_notifications_read(None).await.unwrap();

    assert_eq!(snapshot.unread_count, 0);
    assert!(snapshot.notifications.iter().all(|n| n.is_read));
    assert_eq!(snapshot.notifications.len(), 3);
    assert_eq!(h.backend.call_count("POST /notifications/read-all"), 1);

    let lists_before = h.backend.call_count("GET /notifications");
    let fetched = h.manager.fetch_notifications().await.unwrap();
    assert_eq!(h.backend.call_count("GET /notifications"), lists_before + 1);
    assert_eq!(fetched.notifications.len(), 3);
    assert!(fetched.notifications.iter().all(|n| n.is_read));
    assert_eq!(fetched.unread_count, 0);
    assert_unread_invariant(&fetched);
}

#[tokio::test]
async fn test_mark_one_read_is_idempotent() {
    let h = signed_in_with(vec![notification("a", false), notification("b", false)]).await;

    let first = h.manager.mark_notifications_read(Some("a")).await.unwrap();
    assert_eq!(first.unread_count, 1);
    assert!(first.notifications.iter().any(|n| n.id == "a" && n.is_read));

    let second = h.manager.mark_notifications_read(Some("a")).await.unwrap();
    assert_eq!(second.notifications, first.notifications);
    assert_eq!(second.unread_count, first.unread_count);
    assert_unread_invariant(&second);

    assert_eq!(h.backend.call_count("PATCH /notifications/a/read"), 2);
}

#[tokio::test]
async fn test_mark_read_of_unknown_id_changes_nothing_locally() {
    let h = signed_in_with(vec![notification("a", false)]).await;

    let snapshot = h.manager.mark_notifications_read(Some("missing")).await.unwrap();
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(ids(&snapshot), vec!["a"]);
}

#[tokio::test]
async fn test_failed_ack_leaves_state_unchanged() {
    let h = signed_in_with(vec![notification("a", false)]).await;
    h.backend.fail_ack(true);
    let before = h.manager.snapshot();

    let err = h
        .manager
        .mark_notifications_read(Some("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Sync(GatewayError::Network(_))));

    let err = h.manager.mark_notifications_read(None).await.unwrap_err();
    assert!(matches!(err, SessionError::Sync(_)));

    assert_eq!(h.manager.snapshot(), before);
    assert_eq!(h.backend.call_count("GET /notifications"), 1);
}

#[tokio::test]
async fn test_failed_reconcile_keeps_local_flip() {
    let h = signed_in_with(vec![notification("a", false), notification("b", false)]).await;
    h.backend.fail_list(true);

    let snapshot = h.manager.mark_notifications_read(Some("a")).await.unwrap();

    assert_eq!(snapshot.unread_count, 1);
    assert!(snapshot.notifications.iter().any(|n| n.id == "a" && n.is_read));
    assert!(snapshot.last_sync_error.is_some());
    assert_unread_invariant(&snapshot);
}

#[tokio::test]
async fn test_fetch_replaces_list() {
    let h = signed_in_with(vec![notification("a", false)]).await;
    h.backend
        .set_notifications(&ada(), vec![notification("b", false), notification("a", true)]);

    let snapshot = h.manager.fetch_notifications().await.unwrap();

    assert_eq!(ids(&snapshot), vec!["b", "a"]);
    assert_eq!(snapshot.unread_count, 1);
}

#[tokio::test]
async fn test_fetch_failure_propagates_and_keeps_list() {
    let h = signed_in_with(vec![notification("a", false)]).await;
    h.backend.fail_list(true);

    let err = h.manager.fetch_notifications().await.unwrap_err();
    assert!(matches!(err, SessionError::Sync(_)));
    assert_eq!(ids(&h.manager.snapshot()), vec!["a"]);
}

#[tokio::test]
async fn test_notification_calls_require_sign_in() {
    let h = TestHarness::started().await;

    assert_eq!(
        h.manager.fetch_notifications().await.unwrap_err(),
        SessionError::NotAuthenticated
    );
    assert_eq!(
        h.manager.mark_notifications_read(None).await.unwrap_err(),
        SessionError::NotAuthenticated
    );
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_failure_during_sign_in_is_recorded() {
    let h = TestHarness::started().await;
    h.backend.fail_list(true);

    let snapshot = h.manager.login(ADA_EMAIL, ADA_PASSWORD).await.unwrap();

    assert!(snapshot.is_authenticated());
    assert!(snapshot.notifications.is_empty());
    assert!(snapshot.last_sync_error.is_some());
    assert!(snapshot.channel_open);

    h.connector.push(notification("n1", false)).await;
    let snapshot = h.wait_for(|s| s.unread_count == 1).await;
    assert_eq!(ids(&snapshot), vec!["n1"]);
}
