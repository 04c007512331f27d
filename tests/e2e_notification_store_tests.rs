//! End-to-end tests for the notification store
//!
//! Exercises the store against the REST double:
//! - Pagination and the load_more guard
//! - Interleaving of pushed events with fetched pages
//! - Read state and reset

mod common;

use common::{ids, notification, page, settle, ApiCall, FakeApi, TEST_USER};
use sentinel_realtime::notifications::{
    FetchError, FetchOutcome, NotificationRecord, NotificationStore, PageRequest,
};
use std::sync::Arc;

fn store(api: &Arc<FakeApi>) -> Arc<NotificationStore> {
    Arc::new(NotificationStore::new(api.clone(), 2))
}

#[tokio::test]
async fn test_paginates_until_last_page() {
    let api = FakeApi::new();
    api.push_page(page(
        vec![
            notification("n4", "2024-03-04T10:00:00Z"),
            notification("n3", "2024-03-03T10:00:00Z"),
        ],
        1,
        2,
    ));
    api.push_page(page(
        vec![
            notification("n2", "2024-03-02T10:00:00Z"),
            notification("n1", "2024-03-01T10:00:00Z"),
        ],
        2,
        2,
    ));
    let store = store(&api);

    let outcome = store
        .fetch_page(TEST_USER, PageRequest::first(store.page_size()))
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Applied { fetched: 2 });
    assert!(store.has_more());

    store.load_more(TEST_USER).await.unwrap();
    assert_eq!(ids(&store.notifications()), vec!["n4", "n3", "n2", "n1"]);
    assert!(!store.has_more());

    // Nothing left: no request goes out
    assert_eq!(store.load_more(TEST_USER).await.unwrap(), FetchOutcome::Skipped);
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::FetchPage {
                user_id: TEST_USER.to_string(),
                page: 1,
                limit: 2
            },
            ApiCall::FetchPage {
                user_id: TEST_USER.to_string(),
                page: 2,
                limit: 2
            },
        ]
    );
}

#[tokio::test]
async fn test_pushed_event_during_fetch_survives_page_append() {
    let api = FakeApi::new();
    api.push_page(page(vec![notification("n3", "2024-03-03T10:00:00Z")], 1, 2));
    api.push_page(page(
        vec![
            // Shifted by the new push: the server repeats n3 on page two
            notification("n3", "2024-03-03T10:00:00Z"),
            notification("n2", "2024-03-02T10:00:00Z"),
        ],
        2,
        2,
    ));
    let store = store(&api);
    store
        .fetch_page(TEST_USER, PageRequest::first(2))
        .await
        .unwrap();

    let gate = api.hold_fetches();
    let loader = {
        let store = store.clone();
        tokio::spawn(async move { store.load_more(TEST_USER).await })
    };
    settle().await;
    assert!(store.is_loading());

    store.merge_event(notification("n5", "2024-03-05T10:00:00Z"));
    gate.notify_one();
    loader.await.unwrap().unwrap();

    assert_eq!(ids(&store.notifications()), vec!["n5", "n3", "n2"]);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_concurrent_load_more_issues_one_request() {
    let api = FakeApi::new();
    api.push_page(page(vec![notification("a", "2024-01-02T00:00:00Z")], 1, 3));
    let store = store(&api);
    store
        .fetch_page(TEST_USER, PageRequest::first(2))
        .await
        .unwrap();

    api.push_page(page(vec![notification("b", "2024-01-01T00:00:00Z")], 2, 3));
    let gate = api.hold_fetches();
    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.load_more(TEST_USER).await })
    };
    settle().await;

    assert_eq!(store.load_more(TEST_USER).await.unwrap(), FetchOutcome::Skipped);

    gate.notify_one();
    assert_eq!(
        first.await.unwrap().unwrap(),
        FetchOutcome::Applied { fetched: 1 }
    );
    assert_eq!(api.fetch_count(), 2);
    assert_eq!(store.snapshot().page, 2);
}

#[tokio::test]
async fn test_fetch_error_is_surfaced_and_state_kept() {
    let api = FakeApi::new();
    api.push_page(page(vec![notification("a", "2024-01-02T00:00:00Z")], 1, 2));
    api.push_error(FetchError::Rejected("Session expired".to_string()));
    let store = store(&api);
    store
        .fetch_page(TEST_USER, PageRequest::first(2))
        .await
        .unwrap();

    let err = store.load_more(TEST_USER).await.unwrap_err();
    assert_eq!(err.to_string(), "Session expired");

    let snapshot = store.snapshot();
    assert_eq!(ids(&snapshot.notifications), vec!["a"]);
    assert_eq!(snapshot.page, 1);
    assert!(snapshot.has_more);
    assert!(!snapshot.loading);
    assert_eq!(snapshot.error.as_deref(), Some("Session expired"));

    // The cursor didn't move, so retrying asks for page two again
    store.load_more(TEST_USER).await.unwrap();
    assert_eq!(
        api.calls().last(),
        Some(&ApiCall::FetchPage {
            user_id: TEST_USER.to_string(),
            page: 2,
            limit: 2
        })
    );
    assert!(store.snapshot().error.is_none());
}

#[tokio::test]
async fn test_read_state_is_monotonic_across_updates() {
    let api = FakeApi::new();
    let store = store(&api);

    store.merge_event(notification("x", "2024-01-01T00:00:00Z"));
    assert_eq!(store.unread_count(), 1);
    assert!(store.mark_read("x"));

    // Update without a read field keeps the local read state
    store.merge_event(
        NotificationRecord::new("x").with_field("message", "Zone B breached"),
    );
    let merged = store.get("x").unwrap();
    assert!(merged.is_read());
    assert_eq!(merged.get("message").unwrap(), "Zone B breached");
    assert_eq!(merged.get("createdAt").unwrap(), "2024-01-01T00:00:00Z");
    assert_eq!(store.unread_count(), 0);

    assert!(!store.mark_read("missing"));
}

#[tokio::test]
async fn test_mark_all_read_and_reset() {
    let api = FakeApi::new();
    api.push_page(page(
        vec![
            notification("a", "2024-01-02T00:00:00Z"),
            notification("b", "2024-01-01T00:00:00Z").with_field("read", true),
        ],
        1,
        1,
    ));
    let store = store(&api);
    store
        .fetch_page(TEST_USER, PageRequest::first(2))
        .await
        .unwrap();

    assert_eq!(store.mark_all_read(), 1);
    assert!(store.notifications().iter().all(|n| n.is_read()));

    store.reset();
    let snapshot = store.snapshot();
    assert!(snapshot.notifications.is_empty());
    assert_eq!(snapshot.page, 0);
    assert!(!snapshot.has_more);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn test_reset_discards_late_response() {
    let api = FakeApi::new();
    api.push_page(page(vec![notification("old", "2024-01-01T00:00:00Z")], 1, 1));
    let store = store(&api);

    let gate = api.hold_fetches();
    let fetch = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch_page(TEST_USER, PageRequest::first(2)).await })
    };
    settle().await;

    store.reset();
    gate.notify_one();

    assert_eq!(fetch.await.unwrap().unwrap(), FetchOutcome::Stale);
    assert!(store.is_empty());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_change_notifications() {
    let api = FakeApi::new();
    let store = store(&api);
    let mut changes = store.subscribe_changes();

    store.merge_event(notification("a", "2024-01-01T00:00:00Z"));
    changes.changed().await.unwrap();
    let first = *changes.borrow_and_update();

    store.mark_read("a");
    changes.changed().await.unwrap();
    assert!(*changes.borrow_and_update() > first);
}
