//! Iris: web fetching and content-extraction service

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{info, warn};

use iris::browser::{BrowserDriver, ChromiumDriver, NoopDriver};
use iris::cache::{open_redis, ResponseCache};
use iris::config::{BrowserType, Config, LogFormat, LoggingConfig};
use iris::fetch::Fetcher;
use iris::limiter::DomainRateLimiter;
use iris::robots::RobotsPolicy;
use iris::server::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "iris")]
#[command(about = "Web fetching and content-extraction service")]
#[command(version)]
struct Cli {
    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Listen port override
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    info!(testing_mode = config.testing_mode, "iris starting");

    // Shared store connection; everything degrades gracefully without it.
    let redis = if config.testing_mode {
        None
    } else {
        match open_redis(&config.redis_url).await {
            Ok(manager) => Some(manager),
            Err(e) => {
                warn!(error = %e, "store unreachable; using in-process fallbacks");
                None
            }
        }
    };

    let cache = Arc::new(if !config.cache.enabled {
        info!("response cache disabled by configuration");
        ResponseCache::disabled()
    } else if config.testing_mode {
        ResponseCache::in_memory(&config.cache)
    } else if let Some(manager) = redis.clone() {
        ResponseCache::redis_backed(manager, &config.cache)
    } else {
        ResponseCache::disabled()
    });

    let limiter = Arc::new(DomainRateLimiter::new(redis.clone(), &config.rate_limit));
    let robots = Arc::new(RobotsPolicy::new(
        config.robots.clone(),
        config.browser.user_agent.clone(),
        redis,
    ));

    let driver: Arc<dyn BrowserDriver> = if config.testing_mode {
        Arc::new(NoopDriver::new(config.browser.browser_type))
    } else {
        if config.browser.browser_type != BrowserType::Chromium {
            warn!(
                requested = %config.browser.browser_type,
                "only the chromium driver is built in; launching chromium"
            );
        }
        Arc::new(
            ChromiumDriver::launch(&config.browser)
                .await
                .context("failed to launch browser")?,
        )
    };

    let fetcher = Arc::new(Fetcher::new(
        driver.clone(),
        cache.clone(),
        limiter,
        robots,
        &config,
    ));

    let state = AppState {
        fetcher,
        cache,
        started_at: Instant::now(),
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    let server = HttpServer::new(config.server.clone(), state);
    server.run(shutdown_rx).await?;

    if let Err(e) = driver.shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }
    info!("iris shut down");

    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("iris={},info", config.level))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
