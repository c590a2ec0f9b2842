use std::time::Duration;

use crate::database_ops::error::ConfigError;
use crate::util::env::{env_first, env_flag, env_opt, env_parse};

pub const DEFAULT_API_BASE: &str = "https://osu.ppy.sh/api/v2";
pub const DEFAULT_TOKEN_URL: &str = "https://osu.ppy.sh/oauth/token";
pub const DEFAULT_SCOPE: &str = "public";
pub const DEFAULT_BATCH_SIZE: usize = 370;
pub const DEFAULT_MAX_PERMITS: usize = 370;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// OAuth client credentials for the osu! API.
#[derive(Clone)]
pub struct OsuCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl std::fmt::Debug for OsuCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsuCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub credentials: OsuCredentials,
    pub api_base: String,
    pub token_url: String,
    pub batch_size: usize,
    pub max_permits: usize,
    pub window: Duration,
    pub page_size: usize,
    pub http_timeout: Duration,
    pub write_cover: bool,
    pub db_max_conns: u32,
}

impl EnrichConfig {
    pub fn new(credentials: OsuCredentials) -> Self {
        Self {
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_permits: DEFAULT_MAX_PERMITS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            http_timeout: Duration::from_secs(30),
            write_cover: false,
            db_max_conns: 5,
        }
    }

    /// Read the osu! credentials and tuning knobs from the environment (.env aware).
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = env_first(&["OSU_CLIENT_ID", "CLIENT_ID"])
            .ok_or(ConfigError::Missing("OSU_CLIENT_ID"))?;
        let client_secret = env_first(&["OSU_CLIENT_SECRET", "CLIENT_SECRET"])
            .ok_or(ConfigError::Missing("OSU_CLIENT_SECRET"))?;
        let scope = env_opt("OSU_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string());

        let mut cfg = Self::new(OsuCredentials {
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
            scope,
        });
        if let Some(v) = env_opt("OSU_API_BASE") {
            cfg.api_base = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = env_opt("OSU_TOKEN_URL") {
            cfg.token_url = v.trim().to_string();
        }
        if let Some(v) = env_opt("ENRICH_BATCH_SIZE") {
            cfg.batch_size = parse_positive("ENRICH_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_opt("ENRICH_MAX_PERMITS") {
            cfg.max_permits = parse_positive("ENRICH_MAX_PERMITS", &v)?;
        }
        if let Some(v) = env_opt("ENRICH_WINDOW_SECS") {
            cfg.window = Duration::from_secs(parse_positive("ENRICH_WINDOW_SECS", &v)? as u64);
        }
        if let Some(v) = env_opt("ENRICH_PAGE_SIZE") {
            cfg.page_size = parse_positive("ENRICH_PAGE_SIZE", &v)?;
        }
        cfg.http_timeout = Duration::from_secs(env_parse("ENRICH_HTTP_TIMEOUT_SECS", 30u64).max(1));
        cfg.write_cover = env_flag("ENRICH_WRITE_COVER", false);
        cfg.db_max_conns = env_parse("DB_MAX_CONNS", 5u32).max(1);
        Ok(cfg)
    }
}

/// Parse a size knob; zero is clamped to one, garbage is an error.
fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map(|n| n.max(1))
        .map_err(|_| ConfigError::Invalid {
            key,
            value: raw.to_string(),
        })
}
