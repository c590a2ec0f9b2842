use thiserror::Error;

/// Candidate keys could not be enumerated. Fatal for the run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// No bearer token could be obtained. Fatal for the run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed (status={status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("token response: {0}")]
    Malformed(String),
}

/// Why a single lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("http {status}")]
    Status { status: u16 },
    #[error("network: {0}")]
    Transport(String),
    #[error("parse: {0}")]
    Parse(String),
}

impl FetchCause {
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Transport(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// A batch could not be committed. Isolated to that batch.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Errors that abort a run before any lookup is issued.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("loading candidate keys failed: {0}")]
    Load(#[from] LoadError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

/// Missing or invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
