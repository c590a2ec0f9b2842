use std::time::Duration;

use anyhow::{Context, Result};
use beatmap_enrich::database_ops::types::RecordKey;
use beatmap_enrich::tracing::{init_tracing, DEFAULT_FILTER};
use beatmap_enrich::util::db::Db;
use beatmap_enrich::util::env;
use beatmap_enrich::{osu_pipeline, EnrichConfig};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "beatmap-enrich",
    version,
    about = "Fill playcount, max_combo and mapper for every beatmap from the osu! API"
)]
struct Cli {
    /// Keys fetched concurrently per batch (default: env/370)
    #[arg(long)]
    batch_size: Option<usize>,
    /// Requests allowed per rate-limit window (default: env/370)
    #[arg(long)]
    max_permits: Option<usize>,
    /// Rate-limit window length in seconds (default: env/60)
    #[arg(long)]
    window_secs: Option<u64>,
    /// Rows per UPDATE statement inside a batch transaction (default: env/100)
    #[arg(long)]
    page_size: Option<usize>,
    /// Also write beatmapset cover URLs to beatmaps.cover_url
    #[arg(long, default_value_t = false)]
    write_cover: bool,
    /// Only enrich these beatmap ids, e.g. failed keys from a previous run
    #[arg(long, value_delimiter = ',')]
    only_keys: Option<Vec<i64>>,
    /// Fetch everything but write nothing
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut EnrichConfig) {
        if let Some(n) = self.batch_size {
            cfg.batch_size = n.max(1);
        }
        if let Some(n) = self.max_permits {
            cfg.max_permits = n.max(1);
        }
        if let Some(secs) = self.window_secs {
            cfg.window = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = self.page_size {
            cfg.page_size = n.max(1);
        }
        if self.write_cover {
            cfg.write_cover = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();

    env::preflight_check(
        "beatmap-enrich",
        &[
            &["OSU_CLIENT_ID", "CLIENT_ID"],
            &["OSU_CLIENT_SECRET", "CLIENT_SECRET"],
        ],
        &[
            "OSU_CLIENT_ID",
            "OSU_CLIENT_SECRET",
            "OSU_API_BASE",
            "DATABASE_URL",
            "DB_HOST",
            "ENRICH_BATCH_SIZE",
            "ENRICH_MAX_PERMITS",
            "ENRICH_WINDOW_SECS",
        ],
    )?;

    let mut cfg = EnrichConfig::from_env().context("reading osu! configuration")?;
    cli.apply(&mut cfg);
    info!(
        batch_size = cfg.batch_size,
        max_permits = cfg.max_permits,
        window_secs = cfg.window.as_secs(),
        page_size = cfg.page_size,
        write_cover = cfg.write_cover,
        dry_run = cli.dry_run,
        "starting beatmap enrichment"
    );

    let db_url = env::db_url()?;
    let db = Db::connect(&db_url, cfg.db_max_conns).await?;

    let mut pipeline = osu_pipeline(&cfg, db, cli.dry_run)?;
    if let Some(ids) = &cli.only_keys {
        pipeline = pipeline.with_only_keys(ids.iter().copied().map(RecordKey));
    }

    let summary = pipeline.run_pipeline().await?;
    println!("{summary}");
    if !summary.failed_keys.is_empty() {
        warn!(count = summary.failed_keys.len(), "some beatmaps were not updated");
        let ids: Vec<String> = summary.failed_keys.iter().map(ToString::to_string).collect();
        println!("failed keys: {}", ids.join(","));
    }
    if !summary.failed_batches.is_empty() {
        println!("failed batches: {:?}", summary.failed_batches);
    }
    Ok(())
}
