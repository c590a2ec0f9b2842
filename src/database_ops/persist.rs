use sqlx::Row;
use tracing::{debug, instrument};

use crate::database_ops::error::{LoadError, PersistError};
use crate::database_ops::types::{EnrichmentRecord, RecordKey};
use crate::util::db::Db;

/// Enumerates the catalog rows that are candidates for enrichment.
#[async_trait::async_trait]
pub trait KeySource: Send + Sync {
    async fn load_keys(&self) -> Result<Vec<RecordKey>, LoadError>;
}

/// Writes one batch of records as a single atomic unit. Update-only: keys that
/// are not already stored are skipped without error.
#[async_trait::async_trait]
pub trait BatchPersister: Send + Sync {
    /// Returns the number of rows actually updated.
    async fn persist(&self, records: &[EnrichmentRecord]) -> Result<u64, PersistError>;
}

const SELECT_KEYS_SQL: &str = "SELECT mapid::bigint FROM beatmaps ORDER BY mapid";

const UPDATE_SQL: &str = "UPDATE beatmaps AS b
     SET playcount = v.playcount,
         max_combo = v.max_combo,
         mapper = v.mapper
     FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::text[])
         AS v(mapid, playcount, max_combo, mapper)
     WHERE b.mapid = v.mapid";

const UPDATE_WITH_COVER_SQL: &str = "UPDATE beatmaps AS b
     SET playcount = v.playcount,
         max_combo = v.max_combo,
         mapper = v.mapper,
         cover_url = v.cover_url
     FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::text[], $5::text[])
         AS v(mapid, playcount, max_combo, mapper, cover_url)
     WHERE b.mapid = v.mapid";

/// Postgres-backed key source and persister over the `beatmaps` table.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
    page_size: usize,
    write_cover: bool,
}

impl PgStore {
    pub fn new(db: Db, page_size: usize) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
            write_cover: false,
        }
    }

    /// Also write `cover_url` (the column must exist).
    pub fn with_cover(mut self, write_cover: bool) -> Self {
        self.write_cover = write_cover;
        self
    }
}

/// Column arrays for one UNNEST page.
struct Page {
    mapids: Vec<i64>,
    playcounts: Vec<i64>,
    max_combos: Vec<i64>,
    mappers: Vec<String>,
    covers: Vec<String>,
}

fn page_columns(records: &[EnrichmentRecord]) -> Page {
    Page {
        mapids: records.iter().map(|r| r.key.get()).collect(),
        playcounts: records.iter().map(|r| clamp_i64(r.play_count)).collect(),
        max_combos: records.iter().map(|r| clamp_i64(r.max_combo)).collect(),
        mappers: records.iter().map(|r| r.mapper_name.clone()).collect(),
        covers: records.iter().map(|r| r.cover_image_url.clone()).collect(),
    }
}

/// Split one batch into the UPDATE pages issued inside its transaction.
fn plan_pages(records: &[EnrichmentRecord], page_size: usize) -> Vec<Page> {
    records.chunks(page_size.max(1)).map(page_columns).collect()
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl KeySource for PgStore {
    #[instrument(skip(self))]
    async fn load_keys(&self) -> Result<Vec<RecordKey>, LoadError> {
        let rows = sqlx::query(SELECT_KEYS_SQL)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(RecordKey(row.try_get::<i64, _>(0)?));
        }
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl BatchPersister for PgStore {
    #[instrument(skip_all, fields(records = records.len()))]
    async fn persist(&self, records: &[EnrichmentRecord]) -> Result<u64, PersistError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.db.pool.begin().await?;
        let mut written = 0u64;
        for page in plan_pages(records, self.page_size) {
            let query = if self.write_cover {
                sqlx::query(UPDATE_WITH_COVER_SQL)
                    .persistent(false)
                    .bind(&page.mapids)
                    .bind(&page.playcounts)
                    .bind(&page.max_combos)
                    .bind(&page.mappers)
                    .bind(&page.covers)
            } else {
                sqlx::query(UPDATE_SQL)
                    .persistent(false)
                    .bind(&page.mapids)
                    .bind(&page.playcounts)
                    .bind(&page.max_combos)
                    .bind(&page.mappers)
            };
            let result = query.execute(&mut *tx).await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        debug!(written, "batch committed");
        Ok(written)
    }
}

/// Persister for `--dry-run`: accepts every batch and writes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPersister;

#[async_trait::async_trait]
impl BatchPersister for DryRunPersister {
    async fn persist(&self, records: &[EnrichmentRecord]) -> Result<u64, PersistError> {
        debug!(records = records.len(), "dry run: skipping write");
        Ok(0)
    }
}
