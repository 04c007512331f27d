#![allow(dead_code)]

use sentinel_realtime::notifications::{NotificationPage, NotificationRecord};
use sentinel_realtime::stream::SubscribeOptions;
use serde_json::{json, Value};

pub const TEST_USER: &str = "agent-7";
pub const OTHER_USER: &str = "supervisor-1";
pub const HUB_URL: &str = "http://hub.test/.well-known/mercure";

/// A notification with only an id and a `createdAt` timestamp.
pub fn notification(id: &str, created_at: &str) -> NotificationRecord {
    NotificationRecord::new(id).with_field("createdAt", created_at)
}

pub fn page(notifications: Vec<NotificationRecord>, page: u32, pages: u32) -> NotificationPage {
    NotificationPage {
        notifications,
        page,
        pages,
    }
}

/// Wire form of a pushed notification.
pub fn pushed(id: &str, created_at: &str, message: &str) -> Value {
    json!({ "id": id, "createdAt": created_at, "message": message })
}

pub fn options(topic: &str) -> SubscribeOptions {
    SubscribeOptions {
        topic: topic.to_string(),
        url: HUB_URL.to_string(),
        token: Some("jwt".to_string()),
        ..Default::default()
    }
}

pub fn ids(notifications: &[NotificationRecord]) -> Vec<String> {
    notifications.iter().map(|n| n.id.clone()).collect()
}

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
