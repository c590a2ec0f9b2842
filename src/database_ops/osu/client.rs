use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use tracing::{debug, instrument};

use super::extract::record_from_body;
use crate::config::EnrichConfig;
use crate::database_ops::error::FetchCause;
use crate::database_ops::rate_limit::RateLimiter;
use crate::database_ops::types::{AccessToken, FetchFailure, FetchOutcome, RecordKey};

/// Per-key metadata lookup. Implementations never return an error out of band:
/// every failure is folded into the outcome for that key.
#[async_trait::async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn fetch(&self, key: RecordKey, token: &AccessToken) -> FetchOutcome;
}

/// osu! API v2 `/beatmaps/{id}` client. Every request goes through the shared limiter.
#[derive(Debug, Clone)]
pub struct OsuClient {
    http: Client,
    api_base: String,
    limiter: Arc<RateLimiter>,
}

/// Build the HTTP client shared by authentication and lookups.
pub fn build_http(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("beatmap-enrich/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("failed to construct osu! HTTP client")
}

impl OsuClient {
    pub fn new(http: Client, api_base: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            limiter,
        }
    }

    pub fn from_config(http: Client, cfg: &EnrichConfig, limiter: Arc<RateLimiter>) -> Self {
        Self::new(http, cfg.api_base.clone(), limiter)
    }

    fn beatmap_url(&self, key: RecordKey) -> String {
        format!("{}/beatmaps/{}", self.api_base, key)
    }

    async fn lookup(&self, key: RecordKey, token: &AccessToken) -> Result<String, FetchCause> {
        self.limiter.acquire().await;
        let response = self
            .http
            .get(self.beatmap_url(key))
            .header(header::AUTHORIZATION, token.bearer())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchCause::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status {
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| FetchCause::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MetadataLookup for OsuClient {
    #[instrument(skip_all, fields(key = %key))]
    async fn fetch(&self, key: RecordKey, token: &AccessToken) -> FetchOutcome {
        let body = self
            .lookup(key, token)
            .await
            .map_err(|cause| FetchFailure { key, cause })?;
        let record = record_from_body(key, &body).map_err(|cause| FetchFailure { key, cause })?;
        debug!(
            play_count = record.play_count,
            max_combo = record.max_combo,
            "beatmap fetched"
        );
        Ok(record)
    }
}
