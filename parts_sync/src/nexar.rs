//! Nexar client: OAuth client-credentials token plus GraphQL part search
//!
//! The access token is cached on the client instance and refreshed through
//! [`NexarClient::access_token`]. Two clients never share a token.

use crate::config::{NexarConfig, HTTP_TIMEOUT, TOKEN_EXPIRY_SKEW_SECS};
use crate::error::{Result, SyncError};
use parts_common::nexar::{normalize_search, SearchResponse, SEARCH_MPN_QUERY};
use parts_common::PartLookup;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Token as handed out by the identity endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

pub struct NexarClient {
    config: NexarConfig,
    http: reqwest::Client,
    token: Option<CachedToken>,
}

impl NexarClient {
    pub fn new(config: NexarConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            config,
            http,
            token: None,
        })
    }

    /// Request a fresh token; does not touch the cache
    pub async fn fetch_token(&self) -> Result<AccessToken> {
        log::debug!("Requesting Nexar token from {}", self.config.token_url);

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::Auth(format!("HTTP {} - {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| SyncError::Auth(format!("unreadable token response: {}", e)))
    }

    /// Cached token, fetching a new one when missing or about to expire
    pub async fn access_token(&mut self) -> Result<String> {
        if let Some(cached) = self.token.as_ref().filter(|t| t.is_valid()) {
            return Ok(cached.value.clone());
        }

        let token = self.fetch_token().await?;
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(TOKEN_EXPIRY_SKEW_SECS));
        log::info!("Obtained Nexar access token (usable for {:?})", lifetime);

        self.token = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Drop the cached token so the next call re-authenticates
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Search a part by MPN and normalize the first result
    pub async fn search_by_mpn(&mut self, mpn: &str) -> Result<PartLookup> {
        let token = self.access_token().await?;
        log::debug!("Nexar search for {}", mpn);

        let response = self
            .http
            .post(&self.config.graphql_url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "query": SEARCH_MPN_QUERY,
                "variables": { "mpn": mpn },
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::HttpStatus { status, body });
        }

        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let parsed: SearchResponse = serde_json::from_value(raw.clone())?;
        if let Some(errors) = parsed.error_payload() {
            return Err(SyncError::GraphQl(errors));
        }

        Ok(normalize_search(parsed, raw))
    }
}

#[cfg(test)]
#[path = "nexar_tests.rs"]
mod tests;
