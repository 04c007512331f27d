//! Reload broadcaster shared between independent consumers.
//!
//! A [`ReloadBroadcaster`] is an explicit object, not global state: every
//! consumer gets its own [`BroadcastEndpoint`] and only hears signals
//! published by *other* endpoints, the way a browser `BroadcastChannel`
//! behaves across tabs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastSignal {
    /// Reload data for `scope` (e.g. "notifications", "tasks", "zones").
    Reload { scope: String },
    /// Read state or content of notifications changed elsewhere.
    NotificationsChanged,
    /// The user logged out in another context.
    SessionEnded,
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: Uuid,
    signal: BroadcastSignal,
}

pub struct ReloadBroadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Default for ReloadBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReloadBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// A new participant with its own origin id.
    pub fn endpoint(&self) -> BroadcastEndpoint {
        BroadcastEndpoint {
            origin: Uuid::new_v4(),
            tx: self.tx.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BroadcastEndpoint {
    origin: Uuid,
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastEndpoint {
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Send `signal` to every other endpoint. Returns false when nobody is
    /// listening.
    pub fn publish(&self, signal: BroadcastSignal) -> bool {
        debug!("Broadcasting {:?}", signal);
        self.tx
            .send(Envelope {
                origin: self.origin,
                signal,
            })
            .is_ok()
    }

    /// Deliver signals from other endpoints to `handler` until the returned
    /// handle is unsubscribed or dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, handler: F) -> BroadcastSubscription
    where
        F: Fn(BroadcastSignal) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let origin = self.origin;
        let active = Arc::new(AtomicBool::new(true));
        let task_active = active.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == origin {
                            continue;
                        }
                        if !task_active.load(Ordering::SeqCst) {
                            break;
                        }
                        handler(envelope.signal);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Broadcast subscriber lagged, skipped {} signals", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        BroadcastSubscription {
            task: Some(task),
            active,
        }
    }
}

/// Disposal handle for a broadcast subscription.
pub struct BroadcastSubscription {
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl BroadcastSubscription {
    /// Stop delivery. No handler call starts after this returns.
    pub fn unsubscribe(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for BroadcastSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
