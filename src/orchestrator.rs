use std::collections::BTreeSet;
use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::config::EnrichConfig;
use crate::database_ops::error::PipelineError;
use crate::database_ops::osu::{build_http, Authenticator, MetadataLookup, OsuAuth, OsuClient};
use crate::database_ops::persist::{BatchPersister, DryRunPersister, KeySource, PgStore};
use crate::database_ops::rate_limit::RateLimiter;
use crate::database_ops::scheduler::{BatchReport, BatchScheduler};
use crate::database_ops::types::RecordKey;
use crate::util::db::Db;

/// Outcome of one enrichment run. `succeeded + failed == total_keys`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_keys: usize,
    /// Records whose batch committed.
    pub succeeded: usize,
    /// Fetch failures plus records of batches that could not be committed.
    pub failed: usize,
    pub batches: usize,
    pub rows_written: u64,
    pub failed_keys: Vec<RecordKey>,
    /// 1-based indexes of batches whose persist failed.
    pub failed_batches: Vec<usize>,
}

impl RunSummary {
    fn record(&mut self, report: BatchReport) {
        self.batches += 1;
        self.failed += report.failures.len();
        self.failed_keys
            .extend(report.failures.iter().map(|f| f.key));
        match report.persist {
            Ok(rows) => {
                self.succeeded += report.records.len();
                self.rows_written += rows;
            }
            Err(_) => {
                self.failed += report.records.len();
                self.failed_keys.extend(report.records);
                self.failed_batches.push(report.index);
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} succeeded={} failed={} batches={} rows_written={}",
            self.total_keys, self.succeeded, self.failed, self.batches, self.rows_written
        )
    }
}

/// Load keys, authenticate once, then enrich batch by batch.
pub struct PipelineOrchestrator {
    keys: Arc<dyn KeySource>,
    auth: Arc<dyn Authenticator>,
    lookup: Arc<dyn MetadataLookup>,
    persister: Arc<dyn BatchPersister>,
    batch_size: usize,
    only_keys: Option<BTreeSet<RecordKey>>,
}

impl PipelineOrchestrator {
    pub fn new(
        keys: Arc<dyn KeySource>,
        auth: Arc<dyn Authenticator>,
        lookup: Arc<dyn MetadataLookup>,
        persister: Arc<dyn BatchPersister>,
        batch_size: usize,
    ) -> Self {
        Self {
            keys,
            auth,
            lookup,
            persister,
            batch_size: batch_size.max(1),
            only_keys: None,
        }
    }

    /// Restrict the run to these keys. Keys not present in storage are ignored.
    pub fn with_only_keys(mut self, keys: impl IntoIterator<Item = RecordKey>) -> Self {
        self.only_keys = Some(keys.into_iter().collect());
        self
    }

    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run_pipeline(&self) -> Result<RunSummary, PipelineError> {
        let mut keys = self.keys.load_keys().await.inspect_err(|e| {
            error!(error = %e, "failed to load beatmap ids");
        })?;
        if let Some(only) = &self.only_keys {
            keys.retain(|k| only.contains(k));
        }
        info!(total = keys.len(), "loaded beatmap ids");

        let mut summary = RunSummary {
            total_keys: keys.len(),
            ..RunSummary::default()
        };
        if keys.is_empty() {
            warn!("no beatmaps to enrich");
            return Ok(summary);
        }

        let token = self.auth.authenticate().await.inspect_err(|e| {
            error!(error = %e, "failed to obtain osu! access token");
        })?;

        let scheduler =
            BatchScheduler::new(self.lookup.clone(), self.persister.clone(), self.batch_size);
        let mut reports = pin!(scheduler.run(&keys, &token));
        while let Some(report) = reports.next().await {
            match &report.persist {
                Ok(_) => info!(
                    batch = report.index,
                    "updated extra fields for {} beatmaps in batch {}",
                    report.records.len(),
                    report.index
                ),
                Err(e) => error!(
                    batch = report.index,
                    records = report.records.len(),
                    error = %e,
                    "error updating batch"
                ),
            }
            summary.record(report);
        }

        info!(
            total = summary.total_keys,
            succeeded = summary.succeeded,
            failed = summary.failed,
            rows_written = summary.rows_written,
            "enrichment run finished"
        );
        Ok(summary)
    }
}

/// Wire the osu! client, shared limiter and Postgres store into a pipeline.
pub fn osu_pipeline(cfg: &EnrichConfig, db: Db, dry_run: bool) -> Result<PipelineOrchestrator> {
    // Token and lookup requests draw from the same quota.
    let limiter = Arc::new(RateLimiter::new(cfg.max_permits, cfg.window));
    let http = build_http(cfg.http_timeout)?;
    let auth = OsuAuth::new(
        http.clone(),
        cfg.token_url.clone(),
        cfg.credentials.clone(),
        limiter.clone(),
    );
    let lookup = OsuClient::from_config(http, cfg, limiter);
    let store = Arc::new(PgStore::new(db, cfg.page_size).with_cover(cfg.write_cover));
    let persister: Arc<dyn BatchPersister> = if dry_run {
        Arc::new(DryRunPersister)
    } else {
        store.clone()
    };
    Ok(PipelineOrchestrator::new(
        store,
        Arc::new(auth),
        Arc::new(lookup),
        persister,
        cfg.batch_size,
    ))
}
