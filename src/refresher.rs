use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;

use crate::credentials::CredentialStore;
use crate::error::{RelayError, Result};
use crate::models::CredentialPair;

#[derive(Debug, Clone, Default)]
pub struct ExchangeResponse {
    pub body: String,
    pub set_cookies: Vec<(String, String)>,
}

#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, current: &CredentialPair) -> Result<ExchangeResponse>;
}

pub struct HttpTokenExchange {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, current: &CredentialPair) -> Result<ExchangeResponse> {
        let mut request = self
            .http
            .post(&self.url)
            .header("accept", "application/json")
            .header("authorization", format!("Bearer {}", current.access_token))
            .header("contexttoken", format!("Bearer {}", current.context_token));
        if let Some(cookies) = current.cookie_header() {
            request = request.header(COOKIE, cookies);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let set_cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(RelayError::Upstream(format!("{} - {}", status, body)));
        }

        Ok(ExchangeResponse { body, set_cookies })
    }
}

// `name=value; Path=/; HttpOnly` -> `(name, value)`
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Deserialize)]
struct RenewedTokens {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: Option<String>,
    #[serde(alias = "contextToken", alias = "context_token")]
    contexttoken: Option<String>,
}

fn renewed_pair(current: &CredentialPair, response: &ExchangeResponse) -> Result<CredentialPair> {
    let renewed: RenewedTokens = serde_json::from_str(&response.body)
        .map_err(|err| RelayError::Upstream(format!("token exchange response parse failed: {}", err)))?;

    let access_token = renewed
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RelayError::Upstream("token exchange response missing access token".to_string()))?;
    let context_token = renewed
        .contexttoken
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RelayError::Upstream("token exchange response missing context token".to_string()))?;

    let mut session_cookies = current.session_cookies.clone();
    session_cookies.extend(response.set_cookies.iter().cloned());

    Ok(CredentialPair {
        access_token,
        context_token,
        session_cookies,
    })
}

pub struct TokenRefresher {
    credentials: Arc<CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
}

impl TokenRefresher {
    pub fn new(credentials: Arc<CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self { credentials, exchange }
    }

    /// One exchange. The stored pair is only replaced when the response
    /// carries both renewed tokens.
    pub async fn refresh(&self) -> Result<()> {
        let current = self.credentials.current();
        let response = self.exchange.exchange(&current).await?;
        let renewed = renewed_pair(&current, &response)?;
        self.credentials.save(renewed)?;
        tracing::info!(path = %self.credentials.path().display(), "Credentials refreshed");
        Ok(())
    }

    pub async fn run_once(&self) {
        if let Err(err) = self.refresh().await {
            tracing::error!(error = %err, "{}", failure_message(&err));
        }
    }
}

// A storage error means the exchange succeeded and the new pair is already live.
fn failure_message(err: &RelayError) -> &'static str {
    match err {
        RelayError::Storage { .. } => "Credentials refreshed in memory but not persisted",
        _ => "Token refresh failed, keeping current credentials",
    }
}
