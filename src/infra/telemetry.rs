use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Installs the global subscriber. Events carry the emitting thread's name,
/// so failures inside the worker pool show which `cache-*` worker ran them.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Registers units and help texts for every metric the cache emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            "sos_cache_phase_ms",
            Unit::Milliseconds,
            "Duration of one rebuild phase in milliseconds."
        );
        describe_histogram!(
            "sos_cache_rebuild_ms",
            Unit::Milliseconds,
            "Duration of a full content cache rebuild in milliseconds."
        );
        describe_counter!(
            "sos_cache_rebuild_total",
            Unit::Count,
            "Total number of rebuilds by outcome (complete or degraded)."
        );
        describe_counter!(
            "sos_cache_update_failures_total",
            Unit::Count,
            "Total number of recorded update failures by class."
        );
        describe_gauge!(
            "sos_cache_snapshot_generation",
            Unit::Count,
            "Generation of the currently published snapshot."
        );
    });
}
