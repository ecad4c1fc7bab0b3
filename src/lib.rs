pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::{AnalyzerConfig, ConfigError};
pub use pipeline::analysis::{
    export_json, render_summary_report, AnalysisError, DocumentInput, ErrorKind, FraudAnalysisResult,
    FraudAnalyzer, FraudFlag, StructuredError,
};
pub use pipeline::batch::{BatchAnalyzer, BatchItem, BatchItemResult, BatchReport, WorkerPool};
pub use pipeline::rate_limit::RateLimiter;

/// Install the fmt subscriber, filtered by `RUST_LOG` or the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
