//! In-memory notification collection.
//!
//! Reconciles two independent inputs into one ordered, deduplicated list:
//! paginated REST fetches and individually pushed events. Every mutation is a
//! short critical section that never spans an `.await`, so pushed merges and
//! fetch completions interleave safely on any tokio runtime.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::api::{FetchError, NotificationsApi};
use super::models::{sort_by_recency, NotificationPage, NotificationRecord, PageRequest};
use crate::metrics;

/// Result of a fetch call that didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was applied to the collection.
    Applied { fetched: usize },
    /// Rejected up front: a load is already in flight or there is no next page.
    Skipped,
    /// The response arrived after a newer fetch or a reset superseded it.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// Point-in-time copy of the store, suitable for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreSnapshot {
    pub notifications: Vec<NotificationRecord>,
    /// Last page index applied, 0 when nothing was fetched yet.
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    /// Message of the last failed fetch, cleared by the next successful one.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Replace,
    Append,
}

impl FetchMode {
    fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Replace => "replace",
            FetchMode::Append => "append",
        }
    }
}

#[derive(Default)]
struct StoreState {
    notifications: Vec<NotificationRecord>,
    page: u32,
    has_more: bool,
    loading: bool,
    error: Option<String>,
    /// Bumped by every first-page fetch and every reset; completions carrying
    /// an older value are discarded.
    generation: u64,
    /// Pushed events merged while a first-page fetch is in flight. `None`
    /// when no replace is pending.
    pushed_during_replace: Option<Vec<NotificationRecord>>,
}

pub struct NotificationStore {
    api: Arc<dyn NotificationsApi>,
    page_size: u32,
    state: Mutex<StoreState>,
    changes: watch::Sender<u64>,
}

/// Clears the in-flight flag if a fetch future is dropped before completing.
struct InFlight<'a> {
    state: &'a Mutex<StoreState>,
    generation: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.generation == self.generation {
            state.loading = false;
            state.pushed_during_replace = None;
        }
    }
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationsApi>, page_size: u32) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            api,
            page_size: page_size.max(1),
            state: Mutex::new(StoreState::default()),
            changes,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Receiver that observes a version counter bumped on every mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Fetch a page from the server.
    ///
    /// The first page replaces the collection. Later pages are appended and
    /// are subject to the same guard as [`load_more`](Self::load_more).
    /// On failure the collection and cursor are left untouched and the error
    /// message is recorded in the snapshot.
    pub async fn fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<FetchOutcome, FetchError> {
        let mode = if request.is_first() {
            FetchMode::Replace
        } else {
            FetchMode::Append
        };

        let generation = {
            let mut state = self.state.lock().unwrap();
            if mode == FetchMode::Append && (state.loading || !state.has_more) {
                debug!(
                    "Skipping fetch of page {}: loading={}, has_more={}",
                    request.page, state.loading, state.has_more
                );
                return Ok(FetchOutcome::Skipped);
            }
            if mode == FetchMode::Replace {
                state.generation += 1;
                if state.pushed_during_replace.is_none() {
                    state.pushed_during_replace = Some(Vec::new());
                }
            }
            state.loading = true;
            state.generation
        };
        self.notify_changed();

        let mut in_flight = InFlight {
            state: &self.state,
            generation,
            armed: true,
        };
        let result = self.api.fetch_page(user_id, request).await;
        in_flight.armed = false;

        let outcome = {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                debug!(
                    "Discarding stale {} response for page {}",
                    mode.as_str(),
                    request.page
                );
                metrics::record_fetch(mode.as_str(), "stale");
                return Ok(FetchOutcome::Stale);
            }
            state.loading = false;
            let pushed = match mode {
                FetchMode::Replace => state.pushed_during_replace.take().unwrap_or_default(),
                FetchMode::Append => Vec::new(),
            };

            match result {
                Ok(page) => {
                    let fetched = page.notifications.len();
                    apply_page(&mut state, mode, page, request, pushed);
                    metrics::record_fetch(mode.as_str(), "ok");
                    Ok(FetchOutcome::Applied { fetched })
                }
                Err(err) => {
                    warn!("Failed to fetch notifications page {}: {}", request.page, err);
                    state.error = Some(err.to_string());
                    metrics::record_fetch(mode.as_str(), "error");
                    Err(err)
                }
            }
        };
        self.notify_changed();
        outcome
    }

    /// Fetch the page after the current cursor and append it.
    ///
    /// Returns [`FetchOutcome::Skipped`] immediately when a load is already in
    /// flight or the server reported no further page.
    pub async fn load_more(&self, user_id: &str) -> Result<FetchOutcome, FetchError> {
        let next_page = {
            let state = self.state.lock().unwrap();
            if state.loading || !state.has_more {
                debug!(
                    "load_more ignored: loading={}, has_more={}",
                    state.loading, state.has_more
                );
                return Ok(FetchOutcome::Skipped);
            }
            state.page + 1
        };

        self.fetch_page(
            user_id,
            PageRequest {
                page: next_page,
                limit: self.page_size,
            },
        )
        .await
    }

    /// Merge a pushed record by id, then re-sort the whole collection.
    ///
    /// Records pushed while the first page is loading are merged again on top
    /// of that page when it arrives.
    pub fn merge_event(&self, event: NotificationRecord) -> MergeOutcome {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            if let Some(pushed) = state.pushed_during_replace.as_mut() {
                merge_by_id(pushed, event.clone());
            }
            let outcome = merge_by_id(&mut state.notifications, event);
            sort_by_recency(&mut state.notifications);
            outcome
        };

        metrics::record_merge(match outcome {
            MergeOutcome::Inserted => "inserted",
            MergeOutcome::Updated => "updated",
        });
        self.notify_changed();
        outcome
    }

    /// Set `read` on one record. Returns false when the id is unknown.
    pub fn mark_read(&self, notification_id: &str) -> bool {
        let found = {
            let mut state = self.state.lock().unwrap();
            match state
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id)
            {
                Some(notification) => {
                    notification.mark_read();
                    true
                }
                None => false,
            }
        };

        if found {
            self.notify_changed();
        } else {
            debug!("mark_read: notification {} not in store", notification_id);
        }
        found
    }

    /// Set `read` on every record. Returns how many were unread before.
    pub fn mark_all_read(&self) -> usize {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let mut changed = 0;
            for notification in state.notifications.iter_mut() {
                if !notification.is_read() {
                    changed += 1;
                }
                notification.mark_read();
            }
            changed
        };
        self.notify_changed();
        changed
    }

    /// Back to the initial state. Any fetch still in flight is discarded when
    /// it completes.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock().unwrap();
            let generation = state.generation + 1;
            *state = StoreState {
                generation,
                ..Default::default()
            };
        }
        info!("Notification store reset");
        self.notify_changed();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock().unwrap();
        StoreSnapshot {
            notifications: state.notifications.clone(),
            page: state.page,
            has_more: state.has_more,
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.state.lock().unwrap().notifications.clone()
    }

    pub fn get(&self, notification_id: &str) -> Option<NotificationRecord> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .find(|n| n.id == notification_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unread_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| !n.is_read())
            .count()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().unwrap().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }
}

fn merge_by_id(records: &mut Vec<NotificationRecord>, event: NotificationRecord) -> MergeOutcome {
    match records.iter().position(|n| n.id == event.id) {
        Some(index) => {
            records[index].merge_from(event);
            MergeOutcome::Updated
        }
        None => {
            records.push(event);
            MergeOutcome::Inserted
        }
    }
}

fn apply_page(
    state: &mut StoreState,
    mode: FetchMode,
    page: NotificationPage,
    request: PageRequest,
    pushed: Vec<NotificationRecord>,
) {
    let has_more = page.has_more();
    let applied_page = if page.page == 0 { request.page } else { page.page };

    match mode {
        FetchMode::Replace => {
            let mut seen = HashSet::new();
            state.notifications = page
                .notifications
                .into_iter()
                .filter(|n| seen.insert(n.id.clone()))
                .collect();
            // The page snapshot can predate pushes that arrived meanwhile.
            for event in pushed {
                merge_by_id(&mut state.notifications, event);
            }
        }
        FetchMode::Append => {
            // Pushed records can shift server-side offsets, so a later page may
            // repeat ids we already hold. The in-memory copy wins.
            let mut seen: HashSet<String> =
                state.notifications.iter().map(|n| n.id.clone()).collect();
            for notification in page.notifications {
                if seen.insert(notification.id.clone()) {
                    state.notifications.push(notification);
                }
            }
        }
    }

    sort_by_recency(&mut state.notifications);
    state.page = applied_page;
    state.has_more = has_more;
    state.error = None;
}
