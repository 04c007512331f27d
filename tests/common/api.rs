use async_trait::async_trait;
use sentinel_realtime::notifications::{
    FetchError, NotificationPage, NotificationsApi, PageRequest,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchPage { user_id: String, page: u32, limit: u32 },
    MarkRead(String),
    MarkAllRead(String),
}

/// REST double: answers fetches from a queue and records every call.
///
/// An empty queue answers with an empty, final page. When a gate is set,
/// fetches wait for a permit before answering.
#[derive(Default)]
pub struct FakeApi {
    pages: Mutex<VecDeque<Result<NotificationPage, FetchError>>>,
    ack_failure: Mutex<Option<FetchError>>,
    calls: Mutex<Vec<ApiCall>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

#[allow(dead_code)]
impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, page: NotificationPage) {
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_error(&self, error: FetchError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    /// Make the next acknowledgement fail.
    pub fn fail_next_ack(&self, error: FetchError) {
        *self.ack_failure.lock().unwrap() = Some(error);
    }

    pub fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release_fetches(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ApiCall::FetchPage { .. }))
            .count()
    }

    fn take_ack_result(&self) -> Result<(), FetchError> {
        match self.ack_failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationsApi for FakeApi {
    async fn fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<NotificationPage, FetchError> {
        self.calls.lock().unwrap().push(ApiCall::FetchPage {
            user_id: user_id.to_string(),
            page: request.page,
            limit: request.limit,
        });

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(NotificationPage {
                    notifications: vec![],
                    page: request.page,
                    pages: request.page,
                })
            })
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::MarkRead(notification_id.to_string()));
        self.take_ack_result()
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::MarkAllRead(user_id.to_string()));
        self.take_ack_result()
    }
}
