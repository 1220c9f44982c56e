use std::env;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub fn init_logging() -> Result<()> {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::try_new(&rust_log),
        Err(_) => {
            let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
            EnvFilter::try_new(level.to_lowercase())
        }
    }
    .map_err(|err| anyhow!("Invalid log filter: {}", err))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("Failed to install logger: {}", err))
}
