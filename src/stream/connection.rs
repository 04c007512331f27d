//! Live subscription to a push endpoint.
//!
//! One [`EventStreamConnection`] owns at most one open transport and at most
//! one pending reconnect timer. Transitions:
//!
//! ```text
//! Idle ──start──▶ Connecting ──opened──▶ Open
//!                     ▲   │                │
//!              timer  │   └──error──┐      │ error / end of stream
//!                     │             ▼      ▼
//!                     └──────── Reconnecting
//!
//! any ──stop──▶ Closed
//! ```
//!
//! Every transport task and timer carries the generation it was started
//! with. `stop()` and every new connection bump the generation, so anything
//! still running on behalf of an older one is ignored.

use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{decode_frame, frame_payload};
use super::reconnect_policy::ReconnectPolicy;
use super::transport::{EventTransport, SubscribeRequest};
use crate::metrics;

/// Consumer callback, invoked once per decoded frame.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of [`EventStreamConnection::start`].
///
/// An empty `topic` or `url`, or a missing callback, makes `start` a no-op.
#[derive(Clone, Default)]
pub struct StreamParams {
    pub topic: String,
    pub url: String,
    pub token: Option<String>,
    pub on_event: Option<EventCallback>,
}

impl fmt::Debug for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamParams")
            .field("topic", &self.topic)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

/// Validated parameters of the active subscription.
struct ActiveParams {
    request: SubscribeRequest,
    on_event: EventCallback,
}

impl ActiveParams {
    fn validate(params: StreamParams) -> Option<Self> {
        let mut missing = Vec::new();
        if params.topic.trim().is_empty() {
            missing.push("topic");
        }
        if params.url.trim().is_empty() {
            missing.push("url");
        }
        if params.on_event.is_none() {
            missing.push("callback");
        }
        let on_event = match params.on_event {
            Some(on_event) if missing.is_empty() => on_event,
            _ => {
                warn!(
                    "Not starting event stream, missing {}",
                    missing.join(", ")
                );
                return None;
            }
        };

        let token = params.token.filter(|token| !token.trim().is_empty());
        Some(Self {
            request: SubscribeRequest {
                url: params.url,
                topic: params.topic,
                token,
            },
            on_event,
        })
    }
}

struct Shared {
    state: ConnectionState,
    params: Option<ActiveParams>,
    generation: u64,
    transport_task: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    consecutive_failures: u32,
    retries_scheduled: u64,
    connect_attempts: u64,
}

struct Inner {
    transport: Arc<dyn EventTransport>,
    policy: ReconnectPolicy,
    shared: Mutex<Shared>,
    /// Held for the whole check-and-invoke of one callback, and by `stop()`.
    delivery: Mutex<()>,
}

thread_local! {
    /// Address of the `Inner` whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as delivering for one connection.
struct DeliveryScope {
    previous: usize,
}

impl DeliveryScope {
    fn enter(inner: &Inner) -> Self {
        let previous = DELIVERING.with(|d| d.replace(inner as *const Inner as usize));
        Self { previous }
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// A single logical subscription that survives transport drops.
///
/// Must be used from within a tokio runtime. Dropping the connection stops it.
pub struct EventStreamConnection {
    inner: Arc<Inner>,
}

impl EventStreamConnection {
    pub fn new(transport: Arc<dyn EventTransport>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                policy,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Idle,
                    params: None,
                    generation: 0,
                    transport_task: None,
                    retry_timer: None,
                    consecutive_failures: 0,
                    retries_scheduled: 0,
                    connect_attempts: 0,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Begin connecting. Returns whether a connection attempt was started.
    ///
    /// Ignored while already connecting or open. From `Reconnecting` the
    /// pending timer is cancelled and the attempt happens immediately.
    pub fn start(&self, params: StreamParams) -> bool {
        let Some(active) = ActiveParams::validate(params) else {
            return false;
        };

        let mut shared = self.inner.shared.lock().unwrap();
        match shared.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!(
                    "Event stream for topic {} already {}, ignoring start",
                    active.request.topic, shared.state
                );
                return false;
            }
            ConnectionState::Reconnecting => {
                if let Some(timer) = shared.retry_timer.take() {
                    timer.abort();
                }
            }
            ConnectionState::Idle | ConnectionState::Closed => {}
        }

        info!("Starting event stream for topic {}", active.request.topic);
        shared.params = Some(active);
        shared.consecutive_failures = 0;
        self.inner.connect_locked(&mut shared);
        true
    }

    /// Close the transport and cancel any pending retry. Idempotent.
    ///
    /// Waits for a callback that is already running on another thread, so
    /// once this returns no callback invocation is running or will begin for
    /// this connection. Called from inside the callback itself, it returns
    /// without waiting.
    pub fn stop(&self) {
        let _delivery = self.inner.lock_delivery();
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.state == ConnectionState::Closed && shared.transport_task.is_none() {
            return;
        }

        shared.generation += 1;
        if let Some(timer) = shared.retry_timer.take() {
            timer.abort();
        }
        if let Some(task) = shared.transport_task.take() {
            task.abort();
        }
        if let Some(params) = shared.params.take() {
            info!("Stopped event stream for topic {}", params.request.topic);
        }
        shared.state = ConnectionState::Closed;
    }

    /// Full teardown followed by a fresh `start` with new parameters.
    pub fn restart(&self, params: StreamParams) -> bool {
        self.stop();
        self.start(params)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().unwrap().state
    }

    pub fn topic(&self) -> Option<String> {
        let shared = self.inner.shared.lock().unwrap();
        shared.params.as_ref().map(|p| p.request.topic.clone())
    }

    pub fn pending_retry(&self) -> bool {
        self.inner.shared.lock().unwrap().retry_timer.is_some()
    }

    /// Reconnect timers scheduled over the connection's lifetime.
    pub fn retries_scheduled(&self) -> u64 {
        self.inner.shared.lock().unwrap().retries_scheduled
    }

    /// Transport open attempts over the connection's lifetime.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.shared.lock().unwrap().connect_attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }
}

impl Drop for EventStreamConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    /// Open a new transport, superseding whatever was there before.
    fn connect_locked(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(task) = shared.transport_task.take() {
            task.abort();
        }
        let Some(params) = shared.params.as_ref() else {
            return;
        };
        let request = params.request.clone();
        let on_event = Arc::clone(&params.on_event);

        shared.generation += 1;
        shared.state = ConnectionState::Connecting;
        shared.connect_attempts += 1;
        metrics::STREAM_CONNECT_ATTEMPTS_TOTAL.inc();

        let generation = shared.generation;
        let inner = Arc::clone(self);
        shared.transport_task = Some(tokio::spawn(async move {
            inner.run_transport(generation, request, on_event).await;
        }));
    }

    async fn run_transport(
        self: Arc<Self>,
        generation: u64,
        request: SubscribeRequest,
        on_event: EventCallback,
    ) {
        let mut frames = match self.transport.open(&request).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Event stream for topic {} failed to open: {}", request.topic, e);
                self.handle_transport_error(generation);
                return;
            }
        };

        if !self.mark_open(generation) {
            return;
        }
        info!("Event stream for topic {} is open", request.topic);

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(line) => self.deliver(generation, &line, &on_event),
                Err(e) => {
                    warn!("Event stream for topic {} dropped: {}", request.topic, e);
                    self.handle_transport_error(generation);
                    return;
                }
            }
        }

        info!("Event stream for topic {} closed by server", request.topic);
        self.handle_transport_error(generation);
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut shared = self.shared.lock().unwrap();
        if shared.generation != generation || shared.state != ConnectionState::Connecting {
            return false;
        }
        shared.state = ConnectionState::Open;
        shared.consecutive_failures = 0;
        true
    }

    /// `None` when called from this connection's own callback.
    fn lock_delivery(&self) -> Option<MutexGuard<'_, ()>> {
        let this = self as *const Inner as usize;
        if DELIVERING.with(|d| d.get()) == this {
            return None;
        }
        Some(
            self.delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn is_current(&self, generation: u64) -> bool {
        let shared = self.shared.lock().unwrap();
        shared.generation == generation && shared.state == ConnectionState::Open
    }

    fn deliver(&self, generation: u64, line: &str, on_event: &EventCallback) {
        let Some(payload) = frame_payload(line) else {
            return;
        };

        let event = match decode_frame(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
                metrics::record_frame("malformed");
                return;
            }
        };

        let _delivery = self.lock_delivery();
        if !self.is_current(generation) {
            metrics::record_frame("discarded");
            return;
        }
        metrics::record_frame("delivered");
        let _scope = DeliveryScope::enter(self);
        on_event(event);
    }

    /// Move to `Reconnecting` and arm the retry timer, unless one is pending.
    fn handle_transport_error(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock().unwrap();
        if shared.generation != generation || shared.state == ConnectionState::Closed {
            debug!("Ignoring error from superseded event stream");
            return;
        }
        if shared.retry_timer.is_some() {
            debug!("Reconnect already pending, ignoring transport error");
            return;
        }

        if let Some(task) = shared.transport_task.take() {
            task.abort();
        }

        shared.consecutive_failures += 1;
        if !self.policy.should_retry(shared.consecutive_failures) {
            error!(
                "Event stream giving up after {} consecutive failures",
                shared.consecutive_failures
            );
            shared.state = ConnectionState::Closed;
            shared.params = None;
            shared.generation += 1;
            return;
        }

        shared.state = ConnectionState::Reconnecting;
        shared.retries_scheduled += 1;
        metrics::STREAM_RECONNECTS_SCHEDULED_TOTAL.inc();

        let delay = self.policy.delay;
        debug!("Reconnecting event stream in {:?}", delay);
        let inner = Arc::clone(self);
        shared.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.retry_fired(generation);
        }));
    }

    fn retry_fired(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock().unwrap();
        if shared.generation != generation || shared.state != ConnectionState::Reconnecting {
            return;
        }
        shared.retry_timer = None;
        info!("Reconnecting event stream");
        self.connect_locked(&mut shared);
    }
}
