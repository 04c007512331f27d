//! Dashboard composition: one user's notification list kept live.
//!
//! Wires the [`NotificationStore`] to a push [`Subscription`] and to the
//! [`ReloadBroadcaster`]. Pushed events travel through a channel to a pump
//! task, so the transport never blocks on the store and tearing the session
//! down drops whatever was still queued.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastEndpoint, BroadcastSignal, BroadcastSubscription};
use crate::notifications::{
    FetchError, FetchOutcome, NotificationRecord, NotificationStore, NotificationsApi,
    PageRequest,
};
use crate::stream::{subscribe, ConnectionState, EventTransport, SubscribeOptions, Subscription};

/// Broadcast scope that triggers a notifications refresh.
pub const NOTIFICATIONS_SCOPE: &str = "notifications";

struct Session {
    user_id: String,
    subscription: Subscription,
    pump: JoinHandle<()>,
    reload_task: JoinHandle<()>,
    reload_subscription: BroadcastSubscription,
}

impl Session {
    fn close(mut self) {
        self.subscription.stop();
        self.reload_subscription.unsubscribe();
        self.pump.abort();
        self.reload_task.abort();
        info!("Closed dashboard session for user {}", self.user_id);
    }
}

pub struct DashboardController {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationsApi>,
    transport: Arc<dyn EventTransport>,
    broadcast: BroadcastEndpoint,
    session: Mutex<Option<Session>>,
}

impl DashboardController {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        transport: Arc<dyn EventTransport>,
        broadcast: BroadcastEndpoint,
        page_size: u32,
    ) -> Self {
        Self {
            store: Arc::new(NotificationStore::new(Arc::clone(&api), page_size)),
            api,
            transport,
            broadcast,
            session: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn user_id(&self) -> Option<String> {
        let session = self.session.lock().unwrap();
        session.as_ref().map(|s| s.user_id.clone())
    }

    pub fn connection_state(&self) -> ConnectionState {
        let session = self.session.lock().unwrap();
        session
            .as_ref()
            .map(|s| s.subscription.state())
            .unwrap_or(ConnectionState::Idle)
    }

    /// Start a session for `user_id`: subscribe to pushes and fetch page one.
    ///
    /// A previous session is closed first; switching users also resets the
    /// store. The subscription stays up even when the first fetch fails.
    pub async fn connect(
        &self,
        user_id: &str,
        options: SubscribeOptions,
    ) -> Result<FetchOutcome, FetchError> {
        let previous = self.session.lock().unwrap().take();
        if let Some(previous) = previous {
            let same_user = previous.user_id == user_id;
            previous.close();
            if !same_user {
                self.store.reset();
            }
        }

        let session = self.open_session(user_id, options);
        let raced = self.session.lock().unwrap().replace(session);
        if let Some(raced) = raced {
            raced.close();
        }
        info!("Dashboard session started for user {}", user_id);

        self.refresh_for(user_id).await
    }

    fn open_session(&self, user_id: &str, options: SubscribeOptions) -> Session {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Value>();
        let store = Arc::clone(&self.store);
        let pump = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match serde_json::from_value::<NotificationRecord>(event) {
                    Ok(record) => {
                        debug!("Merging pushed notification {}", record.id);
                        store.merge_event(record);
                    }
                    Err(e) => warn!("Ignoring pushed event without a usable id: {}", e),
                }
            }
        });

        let subscription = subscribe(
            options,
            Arc::clone(&self.transport),
            Arc::new(move |event| {
                let _ = event_tx.send(event);
            }),
        );

        let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();
        let reload_subscription = self.broadcast.subscribe(move |signal| match signal {
            BroadcastSignal::NotificationsChanged => {
                let _ = reload_tx.send(());
            }
            BroadcastSignal::Reload { scope } if scope == NOTIFICATIONS_SCOPE => {
                let _ = reload_tx.send(());
            }
            _ => {}
        });

        let store = Arc::clone(&self.store);
        let reload_user = user_id.to_string();
        let reload_task = tokio::spawn(async move {
            while reload_rx.recv().await.is_some() {
                let request = PageRequest::first(store.page_size());
                if let Err(e) = store.fetch_page(&reload_user, request).await {
                    warn!("Reload after broadcast failed: {}", e);
                }
            }
        });

        Session {
            user_id: user_id.to_string(),
            subscription,
            pump,
            reload_task,
            reload_subscription,
        }
    }

    /// Full reconnect of the push stream with new parameters.
    pub fn resubscribe(&self, options: SubscribeOptions) -> bool {
        let mut session = self.session.lock().unwrap();
        match session.as_mut() {
            Some(session) => {
                session.subscription.resubscribe(options);
                true
            }
            None => {
                debug!("resubscribe ignored: no active session");
                false
            }
        }
    }

    /// Re-fetch the first page for the current user.
    pub async fn refresh(&self) -> Result<FetchOutcome, FetchError> {
        match self.user_id() {
            Some(user_id) => self.refresh_for(&user_id).await,
            None => Ok(FetchOutcome::Skipped),
        }
    }

    async fn refresh_for(&self, user_id: &str) -> Result<FetchOutcome, FetchError> {
        self.store
            .fetch_page(user_id, PageRequest::first(self.store.page_size()))
            .await
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, FetchError> {
        match self.user_id() {
            Some(user_id) => self.store.load_more(&user_id).await,
            None => Ok(FetchOutcome::Skipped),
        }
    }

    /// Acknowledge one notification on the server, then locally.
    pub async fn mark_read(&self, notification_id: &str) -> Result<(), FetchError> {
        self.api.mark_read(notification_id).await?;
        self.store.mark_read(notification_id);
        self.broadcast.publish(BroadcastSignal::NotificationsChanged);
        Ok(())
    }

    /// Acknowledge everything for the current user, then locally.
    pub async fn mark_all_read(&self) -> Result<(), FetchError> {
        let Some(user_id) = self.user_id() else {
            return Ok(());
        };
        self.api.mark_all_read(&user_id).await?;
        self.store.mark_all_read();
        self.broadcast.publish(BroadcastSignal::NotificationsChanged);
        Ok(())
    }

    /// Tear the session down. Idempotent.
    pub fn disconnect(&self) {
        let session = self.session.lock().unwrap().take();
        if let Some(session) = session {
            session.close();
        }
    }
}

impl Drop for DashboardController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
