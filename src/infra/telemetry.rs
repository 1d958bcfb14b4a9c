use std::{io, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout carries command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(true)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "gqlstore_store_hit_total",
            Unit::Count,
            "Total number of record loads served by a store, labelled by store."
        );
        describe_counter!(
            "gqlstore_store_miss_total",
            Unit::Count,
            "Total number of record loads a store could not serve, labelled by store."
        );
        describe_counter!(
            "gqlstore_store_evict_total",
            Unit::Count,
            "Total number of memory store evictions due to capacity."
        );
        describe_histogram!(
            "gqlstore_merge_ms",
            Unit::Milliseconds,
            "Record merge latency in milliseconds."
        );
        describe_counter!(
            "gqlstore_publish_total",
            Unit::Count,
            "Total number of change events published to subscribers."
        );
    });
}
