pub mod config;
pub mod database_ops;
pub mod orchestrator;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::EnrichConfig;
pub use orchestrator::{osu_pipeline, PipelineOrchestrator, RunSummary};
