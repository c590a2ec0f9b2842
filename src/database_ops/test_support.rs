//! In-memory doubles for the remote service and the `beatmaps` table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::database_ops::error::{AuthError, FetchCause, LoadError, PersistError};
use crate::database_ops::osu::{Authenticator, MetadataLookup};
use crate::database_ops::persist::{BatchPersister, KeySource};
use crate::database_ops::types::{
    AccessToken, EnrichmentRecord, FetchFailure, FetchOutcome, RecordKey,
};

pub fn ok_record(key: RecordKey) -> EnrichmentRecord {
    EnrichmentRecord {
        key,
        play_count: key.get() as u64 * 10,
        max_combo: key.get() as u64,
        mapper_name: format!("mapper-{key}"),
        cover_image_url: String::new(),
    }
}

#[derive(Default)]
pub struct StubLookup {
    records: HashMap<RecordKey, EnrichmentRecord>,
    failures: HashMap<RecordKey, FetchCause>,
    delay: Option<Duration>,
    fetched: Mutex<HashMap<RecordKey, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubLookup {
    /// Every key succeeds with `ok_record` unless overridden.
    pub fn all_ok() -> Self {
        Self::default()
    }

    pub fn record(mut self, record: EnrichmentRecord) -> Self {
        self.records.insert(record.key, record);
        self
    }

    pub fn fail(mut self, key: RecordKey, cause: FetchCause) -> Self {
        self.failures.insert(key, cause);
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn fetched_count(&self, key: RecordKey) -> usize {
        self.fetched.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetched.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetadataLookup for StubLookup {
    async fn fetch(&self, key: RecordKey, _token: &AccessToken) -> FetchOutcome {
        *self.fetched.lock().unwrap().entry(key).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(cause) = self.failures.get(&key) {
            return Err(FetchFailure {
                key,
                cause: cause.clone(),
            });
        }
        Ok(self
            .records
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ok_record(key)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRow {
    pub play_count: Option<u64>,
    pub max_combo: Option<u64>,
    pub mapper: Option<String>,
}

/// Update-only table keyed by mapid. Failing calls write nothing.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<RecordKey, StoredRow>>,
    fail_calls: HashSet<usize>,
    fail_load: bool,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<RecordKey>>>,
}

impl MemoryStore {
    pub fn with_keys(ids: &[i64]) -> Self {
        let rows = ids
            .iter()
            .map(|&id| (RecordKey(id), StoredRow::default()))
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Make the n-th (1-based) persist call fail.
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_calls.insert(n);
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn get(&self, key: RecordKey) -> Option<StoredRow> {
        self.rows.lock().unwrap().get(&key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<RecordKey, StoredRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn persist_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keys of every committed batch, in commit order.
    pub fn persisted_batches(&self) -> Vec<Vec<RecordKey>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl KeySource for MemoryStore {
    async fn load_keys(&self) -> Result<Vec<RecordKey>, LoadError> {
        if self.fail_load {
            return Err(LoadError::Db(sqlx::Error::PoolClosed));
        }
        Ok(self.rows.lock().unwrap().keys().copied().collect())
    }
}

#[async_trait::async_trait]
impl BatchPersister for MemoryStore {
    async fn persist(&self, records: &[EnrichmentRecord]) -> Result<u64, PersistError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_calls.contains(&call) {
            return Err(PersistError::Db(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let mut written = 0;
        for r in records {
            if let Some(row) = rows.get_mut(&r.key) {
                *row = StoredRow {
                    play_count: Some(r.play_count),
                    max_combo: Some(r.max_combo),
                    mapper: Some(r.mapper_name.clone()),
                };
                written += 1;
            }
        }
        self.batches
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.key).collect());
        Ok(written)
    }
}

pub struct StubAuth {
    reject: bool,
    calls: AtomicUsize,
}

impl StubAuth {
    pub fn accepting() -> Self {
        Self {
            reject: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Authenticator for StubAuth {
    async fn authenticate(&self) -> Result<AccessToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AuthError::Rejected {
                status: 401,
                body: "invalid_client".into(),
            });
        }
        Ok(AccessToken::new("stub-token"))
    }
}
