use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE, METRIC_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::dispatch::{
    METRIC_DISPATCH_DROPPED, METRIC_DISPATCH_FOLLOWER_LOOKUP_FAILED, METRIC_DISPATCH_LATENCY_MS,
};
use crate::realtime::{
    METRIC_HUB_CONNECTIONS, METRIC_HUB_DELIVERIES, METRIC_HUB_DISCONNECTS, METRIC_HUB_EVICTIONS,
    METRIC_HUB_REGISTRATIONS,
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            METRIC_HUB_CONNECTIONS,
            Unit::Count,
            "Current number of live connections."
        );
        describe_counter!(
            METRIC_HUB_REGISTRATIONS,
            Unit::Count,
            "Total number of registered connections."
        );
        describe_counter!(
            METRIC_HUB_DISCONNECTS,
            Unit::Count,
            "Total number of deregistrations by reason."
        );
        describe_counter!(
            METRIC_HUB_EVICTIONS,
            Unit::Count,
            "Total number of connections evicted while enqueueing."
        );
        describe_counter!(
            METRIC_HUB_DELIVERIES,
            Unit::Count,
            "Total number of frames accepted by connection queues."
        );
        describe_counter!(METRIC_CACHE_HIT, Unit::Count, "Total number of cache hits.");
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATE,
            Unit::Count,
            "Total number of cache keys invalidated."
        );
        describe_counter!(
            METRIC_CACHE_ERROR,
            Unit::Count,
            "Total number of cache backend failures degraded to pass-through."
        );
        describe_counter!(
            METRIC_DISPATCH_DROPPED,
            Unit::Count,
            "Total number of mutations dropped before dispatch."
        );
        describe_counter!(
            METRIC_DISPATCH_FOLLOWER_LOOKUP_FAILED,
            Unit::Count,
            "Total number of failed follower lookups during fan-out."
        );
        describe_histogram!(
            METRIC_DISPATCH_LATENCY_MS,
            Unit::Milliseconds,
            "Dispatch latency in milliseconds."
        );
    });
}
