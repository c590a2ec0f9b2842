use std::fmt;

use super::error::FetchCause;

/// Stable identifier of a catalog row (`beatmaps.mapid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(pub i64);

impl RecordKey {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supplementary attributes fetched for one beatmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRecord {
    pub key: RecordKey,
    pub play_count: u64,
    pub max_combo: u64,
    pub mapper_name: String,
    pub cover_image_url: String,
}

/// Bearer token for one pipeline run. Never logged, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// A lookup that did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub key: RecordKey,
    pub cause: FetchCause,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "beatmap {}: {}", self.key, self.cause)
    }
}

pub type FetchOutcome = Result<EnrichmentRecord, FetchFailure>;

/// Split `keys` into contiguous batches of at most `batch_size` keys.
///
/// A `batch_size` of zero is treated as one.
pub fn partition(keys: &[RecordKey], batch_size: usize) -> Vec<&[RecordKey]> {
    keys.chunks(batch_size.max(1)).collect()
}

/// Number of batches `partition` yields for `total` keys.
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}
