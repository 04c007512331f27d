//! REST collaborator for notification pages and read acknowledgements.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::models::{AckResponse, FetchPageResponse, NotificationPage, PageRequest};

/// Errors surfaced to consumers by REST operations.
///
/// The `Display` output is meant to be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Could not reach the server: {0}")]
    Transport(String),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("{0}")]
    Rejected(String),

    #[error("Invalid response from server: {0}")]
    Decode(String),
}

/// Request/response contract of the notifications REST endpoint.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    async fn fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<NotificationPage, FetchError>;

    async fn mark_read(&self, notification_id: &str) -> Result<(), FetchError>;

    async fn mark_all_read(&self, user_id: &str) -> Result<(), FetchError>;
}

/// `reqwest` implementation of [`NotificationsApi`].
pub struct HttpNotificationsApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNotificationsApi {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the REST api (e.g., "https://api.example.com/api")
    /// * `timeout_sec` - Request timeout in seconds
    /// * `token` - Bearer token attached to every request, if any
    pub fn new(base_url: String, timeout_sec: u64, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_ack(&self, url: String) -> Result<(), FetchError> {
        let response = self
            .authorize(self.client.post(&url))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body: AckResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(FetchError::Status(status.as_u16())),
            Err(e) => return Err(FetchError::Decode(e.to_string())),
        };

        if body.success {
            Ok(())
        } else {
            Err(rejection(body.error, status))
        }
    }
}

fn rejection(error: Option<String>, status: reqwest::StatusCode) -> FetchError {
    match error {
        Some(message) if !message.trim().is_empty() => FetchError::Rejected(message),
        _ if !status.is_success() => FetchError::Status(status.as_u16()),
        _ => FetchError::Rejected("Request was not successful".to_string()),
    }
}

#[async_trait]
impl NotificationsApi for HttpNotificationsApi {
    async fn fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<NotificationPage, FetchError> {
        let url = format!(
            "{}/notifications/{}?page={}&limit={}",
            self.base_url,
            urlencoding::encode(user_id),
            request.page,
            request.limit
        );
        debug!("Fetching notifications page {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body: FetchPageResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(FetchError::Status(status.as_u16())),
            Err(e) => return Err(FetchError::Decode(e.to_string())),
        };

        if !body.success {
            return Err(rejection(body.error, status));
        }

        Ok(NotificationPage {
            notifications: body.notifications,
            page: if body.page == 0 { request.page } else { body.page },
            pages: body.pages,
        })
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), FetchError> {
        let url = format!(
            "{}/notifications/{}/read",
            self.base_url,
            urlencoding::encode(notification_id)
        );
        self.post_ack(url).await
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<(), FetchError> {
        let url = format!(
            "{}/notifications/{}/read-all",
            self.base_url,
            urlencoding::encode(user_id)
        );
        self.post_ack(url).await
    }
}
