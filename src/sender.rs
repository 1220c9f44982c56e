use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::error::{RelayError, Result};
use crate::models::ChatPayload;

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, payload: &ChatPayload) -> Result<()>;
}

pub struct WebhookSender {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookSender {
    pub fn new(http: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl ChatSink for WebhookSender {
    async fn send(&self, payload: &ChatPayload) -> Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!("{} - {}", status, body)));
        }

        Ok(())
    }
}
