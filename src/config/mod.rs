mod file_config;

pub use file_config::{FileConfig, StreamConfig};

use crate::notifications::DEFAULT_PAGE_SIZE;
use crate::stream::{SubscribeOptions, DEFAULT_RECONNECT_DELAY};
use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub user_id: Option<String>,
    pub api_url: Option<String>,
    pub hub_url: Option<String>,
    pub topic: Option<String>,
    pub token: Option<String>,
    pub page_size: u32,
    pub request_timeout_sec: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: Option<u32>,
    pub metrics: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            api_url: None,
            hub_url: None,
            topic: None,
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_sec: 30,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_reconnect_attempts: None,
            metrics: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub user_id: String,
    pub api_url: String,
    pub request_timeout_sec: u64,
    pub page_size: u32,
    pub metrics_enabled: bool,

    pub stream: StreamSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub hub_url: String,
    pub topic: String,
    pub token: Option<String>,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: Option<u32>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let stream_file = file.stream.unwrap_or_default();

        let user_id = file
            .user_id
            .or_else(|| cli.user_id.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("user_id must be specified via --user-id or in config file"))?;

        let api_url = file
            .api_url
            .or_else(|| cli.api_url.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("api_url must be specified via --api-url or in config file"))?;

        let hub_url = stream_file
            .hub_url
            .or_else(|| cli.hub_url.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("hub_url must be specified via --hub-url or in the [stream] config section")
            })?;

        for (name, url) in [("api_url", &api_url), ("hub_url", &hub_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("{} must be an http(s) URL: {}", name, url);
            }
        }

        // Per-user topic unless told otherwise
        let topic = stream_file
            .topic
            .or_else(|| cli.topic.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_topic(&user_id));

        let token = stream_file
            .token
            .or_else(|| cli.token.clone())
            .filter(|s| !s.trim().is_empty());

        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be greater than zero");
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);

        let reconnect_delay_ms = stream_file
            .reconnect_delay_ms
            .unwrap_or(cli.reconnect_delay_ms);
        if reconnect_delay_ms == 0 {
            bail!("reconnect_delay_ms must be greater than zero");
        }

        let max_reconnect_attempts = stream_file
            .max_reconnect_attempts
            .or(cli.max_reconnect_attempts);

        let metrics_enabled = file.metrics.unwrap_or(cli.metrics);

        Ok(Self {
            user_id,
            api_url,
            request_timeout_sec,
            page_size,
            metrics_enabled,
            stream: StreamSettings {
                hub_url,
                topic,
                token,
                reconnect_delay: Duration::from_millis(reconnect_delay_ms),
                max_reconnect_attempts,
            },
        })
    }

    pub fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            topic: self.stream.topic.clone(),
            url: self.stream.hub_url.clone(),
            token: self.stream.token.clone(),
            reconnect_delay: Some(self.stream.reconnect_delay),
            max_reconnect_attempts: self.stream.max_reconnect_attempts,
        }
    }
}

pub fn default_topic(user_id: &str) -> String {
    format!("notifications/{}", user_id)
}
