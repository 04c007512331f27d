//! User notifications: REST collaborator, record model and the reconciling store.

mod api;
mod models;
mod store;

pub use api::{FetchError, HttpNotificationsApi, NotificationsApi};
pub use models::{
    parse_timestamp, sort_by_recency, AckResponse, FetchPageResponse, NotificationPage,
    NotificationRecord, PageRequest, CREATED_AT_FIELD, DATE_FIELD, DEFAULT_PAGE_SIZE, READ_FIELD,
};
pub use store::{FetchOutcome, MergeOutcome, NotificationStore, StoreSnapshot};
