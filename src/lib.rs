//! Sentinel real-time core
//!
//! Live notification feed for the guarding dashboards: a self-healing push
//! subscription and the store that reconciles pushed events with paginated
//! REST pages.

pub mod broadcast;
pub mod config;
pub mod dashboard;
pub mod metrics;
pub mod notifications;
pub mod stream;

// Re-export commonly used types for convenience
pub use broadcast::{BroadcastEndpoint, BroadcastSignal, ReloadBroadcaster};
pub use dashboard::DashboardController;
pub use notifications::{NotificationRecord, NotificationStore};
pub use stream::{subscribe, EventStreamConnection, SubscribeOptions, Subscription};
