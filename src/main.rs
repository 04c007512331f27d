use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentinel_realtime::config::{AppConfig, CliConfig, FileConfig};
use sentinel_realtime::notifications::{HttpNotificationsApi, NotificationsApi};
use sentinel_realtime::stream::{EventTransport, HttpEventTransport};
use sentinel_realtime::{metrics, DashboardController, ReloadBroadcaster};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

/// Follow a user's notification feed and log changes as they arrive.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// User whose notifications are followed.
    #[clap(long)]
    pub user_id: Option<String>,

    /// Base URL of the REST API (e.g. https://host/api).
    #[clap(long)]
    pub api_url: Option<String>,

    /// URL of the push hub.
    #[clap(long)]
    pub hub_url: Option<String>,

    /// Topic to subscribe to. Defaults to notifications/<user-id>.
    #[clap(long)]
    pub topic: Option<String>,

    /// Bearer token for the hub and the REST API.
    #[clap(long)]
    pub token: Option<String>,

    /// Notifications requested per page.
    #[clap(long, default_value_t = 10)]
    pub page_size: u32,

    /// Timeout in seconds for REST requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,

    /// Delay in milliseconds before reconnecting a dropped stream.
    #[clap(long, default_value_t = 3000)]
    pub reconnect_delay_ms: u64,

    /// Give up after this many consecutive failed connections. Unbounded if unset.
    #[clap(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Collect metrics and print them on exit.
    #[clap(long)]
    pub metrics: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            user_id: self.user_id.clone(),
            api_url: self.api_url.clone(),
            hub_url: self.hub_url.clone(),
            topic: self.topic.clone(),
            token: self.token.clone(),
            page_size: self.page_size,
            request_timeout_sec: self.request_timeout_sec,
            reconnect_delay_ms: self.reconnect_delay_ms,
            max_reconnect_attempts: self.max_reconnect_attempts,
            metrics: self.metrics,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    if config.metrics_enabled {
        info!("Initializing metrics...");
        metrics::init_metrics();
    }

    let api: Arc<dyn NotificationsApi> = Arc::new(HttpNotificationsApi::new(
        config.api_url.clone(),
        config.request_timeout_sec,
        config.stream.token.clone(),
    )?);
    let transport: Arc<dyn EventTransport> = Arc::new(HttpEventTransport::new()?);
    let broadcaster = ReloadBroadcaster::default();

    let dashboard =
        DashboardController::new(api, transport, broadcaster.endpoint(), config.page_size);

    info!(
        "Following notifications for {} on topic {} via {}",
        config.user_id, config.stream.topic, config.stream.hub_url
    );
    if let Err(e) = dashboard
        .connect(&config.user_id, config.subscribe_options())
        .await
    {
        // The push stream stays up; later reloads may succeed.
        warn!("Initial notifications fetch failed: {}", e);
    }

    let store = Arc::clone(dashboard.store());
    let mut changes = store.subscribe_changes();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = store.snapshot();
                let unread = snapshot.notifications.iter().filter(|n| !n.is_read()).count();
                match snapshot.notifications.first() {
                    Some(latest) => info!(
                        "{} notifications ({} unread), latest: {} [{}]",
                        snapshot.notifications.len(),
                        unread,
                        latest.id,
                        dashboard.connection_state()
                    ),
                    None => info!("No notifications [{}]", dashboard.connection_state()),
                }
            }
        }
    }

    dashboard.disconnect();

    if config.metrics_enabled {
        print!("{}", metrics::gather_text()?);
    }

    Ok(())
}
