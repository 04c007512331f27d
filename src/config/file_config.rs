use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub user_id: Option<String>,
    pub api_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub page_size: Option<u32>,
    pub metrics: Option<bool>,

    // Feature configs
    pub stream: Option<StreamConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub hub_url: Option<String>,
    pub topic: Option<String>,
    pub token: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
