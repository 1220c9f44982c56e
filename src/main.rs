mod config;
mod credentials;
mod error;
mod fetcher;
mod formatter;
mod logger;
mod models;
mod poller;
mod refresher;
mod scheduler;
mod sender;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::fetcher::HaloClient;
use crate::formatter::AnnouncementFormatter;
use crate::poller::AnnouncementPoller;
use crate::refresher::{HttpTokenExchange, TokenRefresher};
use crate::scheduler::Scheduler;
use crate::sender::WebhookSender;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logging()?;

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!(
        course_count = config.courses.len(),
        courses = config.courses.iter().map(|(_, code)| code).collect::<Vec<_>>().join(","),
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        recency_window_ms = config.recency_window.as_millis() as u64,
        "Starting Halo announcement relay"
    );

    let credentials = Arc::new(
        CredentialStore::open(&config.credentials_path).context("Failed to load Halo credentials")?,
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let source = Arc::new(HaloClient::new(
        http.clone(),
        config.graphql_url.clone(),
        Arc::clone(&credentials),
        config.recency_window,
    ));
    let sink = Arc::new(WebhookSender::new(http.clone(), config.webhook_url.clone()));
    let poller = Arc::new(AnnouncementPoller::new(
        config.courses.clone(),
        source,
        AnnouncementFormatter::from_config(&config),
        sink,
    ));

    let mut scheduler = Scheduler::new();

    scheduler.every("poll", config.poll_interval, std::time::Duration::ZERO, move || {
        let poller = Arc::clone(&poller);
        async move {
            poller.tick().await;
        }
    });

    match config.token_refresh_url.as_deref() {
        Some(url) => {
            let exchange = Arc::new(HttpTokenExchange::new(http.clone(), url));
            let refresher = Arc::new(TokenRefresher::new(Arc::clone(&credentials), exchange));
            tracing::info!(
                refresh_interval_ms = config.refresh_interval.as_millis() as u64,
                "Token refresh enabled"
            );
            scheduler.every("refresh", config.refresh_interval, config.refresh_interval, move || {
                let refresher = Arc::clone(&refresher);
                async move {
                    refresher.run_once().await;
                }
            });
        }
        None => tracing::warn!("HALO_TOKEN_REFRESH_URL is not set, credentials will not be refreshed"),
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, draining in-flight work");
    scheduler.shutdown().await;

    tracing::info!("Service stopped");
    Ok(())
}
