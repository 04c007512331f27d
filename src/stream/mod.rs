//! Real-time push subscription.
//!
//! [`subscribe`] is the consumer-facing entry point: it starts an
//! [`EventStreamConnection`] and hands back a [`Subscription`] that tears it
//! down on `stop()` or drop.

pub mod codec;
pub mod connection;
pub mod reconnect_policy;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use connection::{ConnectionState, EventCallback, EventStreamConnection, StreamParams};
pub use reconnect_policy::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
pub use transport::{EventTransport, FrameStream, HttpEventTransport, SubscribeRequest, TransportError};

/// What a consumer asks for when subscribing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub topic: String,
    pub url: String,
    pub token: Option<String>,
    /// Defaults to [`DEFAULT_RECONNECT_DELAY`].
    pub reconnect_delay: Option<Duration>,
    /// Defaults to unbounded.
    pub max_reconnect_attempts: Option<u32>,
}

impl SubscribeOptions {
    pub fn policy(&self) -> ReconnectPolicy {
        let policy = ReconnectPolicy::fixed(self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY));
        match self.max_reconnect_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }
}

/// Teardown handle returned by [`subscribe`].
pub struct Subscription {
    connection: EventStreamConnection,
    transport: Arc<dyn EventTransport>,
    on_notification: EventCallback,
}

impl Subscription {
    /// Close the stream and cancel any pending reconnect. Idempotent.
    pub fn stop(&self) {
        self.connection.stop();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &EventStreamConnection {
        &self.connection
    }

    /// Replace the subscription with one for new options, keeping the same
    /// callback. Always a full reconnect.
    pub fn resubscribe(&mut self, options: SubscribeOptions) {
        let replacement = subscribe(
            options,
            Arc::clone(&self.transport),
            Arc::clone(&self.on_notification),
        );
        // Dropping the old subscription stops its connection.
        *self = replacement;
    }
}

/// Subscribe to `options.topic` and invoke `on_notification` for every
/// decoded event until the returned handle is stopped or dropped.
pub fn subscribe(
    options: SubscribeOptions,
    transport: Arc<dyn EventTransport>,
    on_notification: EventCallback,
) -> Subscription {
    let connection = EventStreamConnection::new(Arc::clone(&transport), options.policy());
    connection.start(StreamParams {
        topic: options.topic,
        url: options.url,
        token: options.token,
        on_event: Some(Arc::clone(&on_notification)),
    });

    Subscription {
        connection,
        transport,
        on_notification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_policy_defaults() {
        let options = SubscribeOptions {
            topic: "alerts".to_string(),
            url: "http://hub".to_string(),
            ..Default::default()
        };
        assert_eq!(options.policy(), ReconnectPolicy::default());
    }

    #[test]
    fn test_options_policy_overrides() {
        let options = SubscribeOptions {
            reconnect_delay: Some(Duration::from_millis(500)),
            max_reconnect_attempts: Some(4),
            ..Default::default()
        };
        let policy = options.policy();
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, Some(4));
    }
}
