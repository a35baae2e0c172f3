//! Logging initialization and configuration.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Dependencies that log every connection and query at `info`.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "reqwest=warn", "sqlx=warn", "tower_http=info"];

/// Filter from `RUST_LOG`, or from the configured level with noisy
/// transport crates held back.
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|d| d.to_string()));
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// `json` emits one object per event with the current span's fields
/// (`job_id`, `deploy_job_id`, `request_id`); any other format is the
/// human-readable pretty printer.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let subscriber = tracing_subscriber::registry().with(build_filter(&config.level));

    if config.format == "json" {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        subscriber
            .with(fmt::layer().pretty().with_span_events(FmtSpan::CLOSE))
            .try_init()
    }
}
