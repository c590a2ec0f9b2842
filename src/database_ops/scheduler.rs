use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, Stream};
use tracing::{info, warn};

use crate::database_ops::error::PersistError;
use crate::database_ops::osu::MetadataLookup;
use crate::database_ops::persist::BatchPersister;
use crate::database_ops::types::{
    batch_count, partition, AccessToken, EnrichmentRecord, FetchFailure, RecordKey,
};

/// What happened to one batch: every key either produced a record or a failure,
/// and the records were handed to the persister once.
#[derive(Debug)]
pub struct BatchReport {
    /// 1-based position of the batch in the run.
    pub index: usize,
    pub total_batches: usize,
    pub keys: usize,
    pub records: Vec<RecordKey>,
    pub failures: Vec<FetchFailure>,
    /// Rows updated, or why the batch could not be committed.
    pub persist: Result<u64, PersistError>,
}

impl BatchReport {
    pub fn persisted(&self) -> bool {
        self.persist.is_ok()
    }
}

/// Drives fan-out lookups one batch at a time and forwards each finished batch to
/// the persister before starting the next.
pub struct BatchScheduler {
    lookup: Arc<dyn MetadataLookup>,
    persister: Arc<dyn BatchPersister>,
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(
        lookup: Arc<dyn MetadataLookup>,
        persister: Arc<dyn BatchPersister>,
        batch_size: usize,
    ) -> Self {
        Self {
            lookup,
            persister,
            batch_size: batch_size.max(1),
        }
    }

    /// Lazily process `keys` batch by batch. Nothing is fetched until the stream is
    /// polled, and batch N+1 is not started until batch N's report has been yielded.
    pub fn run<'s>(
        &'s self,
        keys: &'s [RecordKey],
        token: &'s AccessToken,
    ) -> impl Stream<Item = BatchReport> + 's {
        let total_batches = batch_count(keys.len(), self.batch_size);
        let batches = partition(keys, self.batch_size).into_iter().enumerate();
        stream::unfold(batches, move |mut batches| async move {
            let (i, batch) = batches.next()?;
            let report = self.process_batch(i + 1, total_batches, batch, token).await;
            Some((report, batches))
        })
    }

    async fn process_batch(
        &self,
        index: usize,
        total_batches: usize,
        batch: &[RecordKey],
        token: &AccessToken,
    ) -> BatchReport {
        // Fan out every key at once; the shared rate limiter is the only throttle.
        let outcomes = join_all(batch.iter().map(|&key| self.lookup.fetch(key, token))).await;

        let mut records: Vec<EnrichmentRecord> = Vec::with_capacity(batch.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(failure) => {
                    warn!(
                        batch = index,
                        key = %failure.key,
                        error = %failure.cause,
                        "error fetching details for beatmap"
                    );
                    failures.push(failure);
                }
            }
        }
        info!(
            batch = index,
            total_batches,
            fetched = records.len(),
            failed = failures.len(),
            "processed batch {} of {}",
            index,
            total_batches
        );

        let persist = if records.is_empty() {
            Ok(0)
        } else {
            self.persister.persist(&records).await
        };

        BatchReport {
            index,
            total_batches,
            keys: batch.len(),
            records: records.iter().map(|r| r.key).collect(),
            failures,
            persist,
        }
    }
}
