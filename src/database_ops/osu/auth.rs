/// osu! OAuth 2.0 client-credentials authentication
///
/// Exchanges the application's client id/secret for a bearer token that is
/// reused for every lookup in a run.
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::OsuCredentials;
use crate::database_ops::error::AuthError;
use crate::database_ops::rate_limit::RateLimiter;
use crate::database_ops::types::AccessToken;

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<AccessToken, AuthError>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct OsuAuth {
    http: Client,
    token_url: String,
    credentials: OsuCredentials,
    limiter: Arc<RateLimiter>,
}

impl OsuAuth {
    pub fn new(
        http: Client,
        token_url: impl Into<String>,
        credentials: OsuCredentials,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            limiter,
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for OsuAuth {
    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn authenticate(&self) -> Result<AccessToken, AuthError> {
        debug!(client_id = %self.credentials.client_id, scope = %self.credentials.scope, "requesting OAuth token");
        let payload = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            scope: &self.credentials.scope,
        };

        self.limiter.acquire().await;
        let response = self.http.post(&self.token_url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: truncate_for_log(body, 200),
            });
        }

        let text = response.text().await?;
        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::Malformed(format!("{e}: {}", truncate_for_log(text, 200))))?;
        let access_token = token
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AuthError::Malformed("missing access_token".to_string()))?;

        info!(
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            expires_in = token.expires_in.unwrap_or_default(),
            "authenticated with osu! API"
        );
        Ok(AccessToken::new(access_token))
    }
}

pub(crate) fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}
