//! Tracing setup and job-scoped spans.

use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

use revid_queue::JobId;

/// Initialize the global tracing subscriber. `RUST_LOG` controls filtering;
/// `LOG_JSON=1` switches to JSON output for log shippers.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("LOG_JSON").is_ok_and(|v| v == "1") {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

/// A span carrying job identity for every log line inside a handler.
pub fn job_span(job_id: JobId, kind: &str) -> Span {
    tracing::info_span!("job", job_id = %job_id, kind)
}
