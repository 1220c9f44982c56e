use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::models::CourseRegistry;

pub const DEFAULT_CREDENTIALS_PATH: &str = "./cache/auth-token.json";
pub const DEFAULT_GRAPHQL_URL: &str = "https://gateway.halo.gcu.edu";
pub const DEFAULT_RESOURCE_BASE_URL: &str = "https://halo.gcu.edu/resource";
pub const DEFAULT_EMBED_COLOR: u32 = 0x26b3ff;

#[derive(Debug, Clone)]
pub struct Config {
    pub courses: CourseRegistry,
    pub webhook_url: String,
    pub credentials_path: PathBuf,
    pub poll_interval: Duration,
    pub refresh_interval: Duration,
    pub recency_window: Duration,
    pub graphql_url: String,
    /// `None` disables the token refresher.
    pub token_refresh_url: Option<String>,
    pub resource_base_url: String,
    pub request_timeout: Duration,
    pub embed_color: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|val| val.trim().to_string()).filter(|val| !val.is_empty());

        let courses_raw = get("HALO_COURSES")
            .ok_or_else(|| RelayError::Config("HALO_COURSES must be set (id=CODE,...)".to_string()))?;
        let courses = CourseRegistry::parse(&courses_raw)?;

        let webhook_url = get("WEBHOOK_URL").ok_or_else(|| RelayError::Config("WEBHOOK_URL must be set".to_string()))?;

        let embed_color = match get("EMBED_COLOR") {
            Some(raw) => parse_color(&raw)?,
            None => DEFAULT_EMBED_COLOR,
        };

        Ok(Self {
            courses,
            webhook_url,
            credentials_path: get("CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH)),
            poll_interval: millis(&get, "POLL_INTERVAL_MS", 10_000)?,
            refresh_interval: millis(&get, "REFRESH_INTERVAL_MS", 60 * 60 * 1000)?,
            recency_window: millis(&get, "RECENCY_WINDOW_MS", 10_000)?,
            graphql_url: get("HALO_GRAPHQL_URL").unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
            token_refresh_url: get("HALO_TOKEN_REFRESH_URL"),
            resource_base_url: get("HALO_RESOURCE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RESOURCE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout: millis(&get, "REQUEST_TIMEOUT_MS", 30_000)?,
            embed_color,
        })
    }
}

fn millis<G>(get: &G, key: &str, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let value = match get(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| RelayError::Config(format!("{} must be a whole number of milliseconds, got `{}`", key, raw)))?,
        None => default,
    };
    if value == 0 {
        return Err(RelayError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_millis(value))
}

fn parse_color(raw: &str) -> Result<u32> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix('#')) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|_| RelayError::Config(format!("EMBED_COLOR `{}` is not a colour", raw)))
}
