//! Logging and OpenTelemetry setup for `ordermgt-server`.
//!
//! The console subscriber is always installed: `RUST_LOG` filters it
//! (default `info`) and events are pretty-printed with local RFC 3339
//! timestamps. On top of it:
//!
//! - `tracing`: handler spans are bridged into an OpenTelemetry tracer.
//! - `metrics`: the counters below are registered on an OpenTelemetry meter.
//! - `stdout`: both providers export to stdout every five seconds.
//!   Without it spans and metrics are collected but never leave the process.
//!
//! | name                | kind           | meaning                                    |
//! |---------------------|----------------|--------------------------------------------|
//! | `requests`          | counter        | RPCs accepted, labelled by `method`        |
//! | `streams_inflight`  | up/down        | streaming calls currently running          |
//! | `errors`            | counter        | calls that ended with an error             |
//! | `stream_duration`   | histogram (ms) | end-to-end duration of streaming calls     |
//! | `shipments_flushed` | counter        | combined shipments sent by `ProcessOrders` |
//! | `orders_aggregated` | counter        | orders added to a batch window             |
//!
//! The recording helpers do nothing until [`init_telemetry`] ran with
//! `metrics` enabled.

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!("`stdout` exports spans or metrics; enable `tracing` and/or `metrics`.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::{Resource, error::OTelSdkResult};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider};

const SERVICE_NAME: &str = "ordermgt";

/// How often the stdout exporters emit.
#[cfg(feature = "stdout")]
pub const EXPORT_INTERVAL: core::time::Duration = core::time::Duration::from_secs(5);

/// OpenTelemetry providers kept alive for the lifetime of the server.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    tracer_provider: SdkTracerProvider,
    #[cfg(feature = "metrics")]
    meter_provider: SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics, then stops the providers.
    ///
    /// Failures go to stderr: the subscriber may already be torn down.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        report(
            "tracer",
            [
                self.tracer_provider.force_flush(),
                self.tracer_provider.shutdown(),
            ],
        );
        #[cfg(feature = "metrics")]
        report(
            "meter",
            [
                self.meter_provider.force_flush(),
                self.meter_provider.shutdown(),
            ],
        );
    }
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn report(provider: &str, results: [OTelSdkResult; 2]) {
    for err in results.into_iter().filter_map(Result::err) {
        eprintln!("{provider} provider: {err}");
    }
}

/// Installs the global subscriber and, per enabled features, the
/// OpenTelemetry providers.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let (registry, tracer_provider) = {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        let provider = build_tracer_provider();
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let provider = build_meter_provider();
        opentelemetry::global::set_meter_provider(provider.clone());
        let _ = METRICS.set(Metrics::new(&opentelemetry::global::meter_with_scope(scope)));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "tracing")]
fn build_tracer_provider() -> SdkTracerProvider {
    let builder = SdkTracerProvider::builder().with_resource(resource());
    #[cfg(feature = "stdout")]
    let builder = builder.with_batch_exporter(opentelemetry_stdout::SpanExporter::default());
    builder.build()
}

#[cfg(feature = "metrics")]
fn build_meter_provider() -> SdkMeterProvider {
    let builder = SdkMeterProvider::builder().with_resource(resource());
    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        opentelemetry_sdk::metrics::PeriodicReader::builder(
            opentelemetry_stdout::MetricExporter::default(),
        )
        .with_interval(EXPORT_INTERVAL)
        .build(),
    );
    builder.build()
}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Metrics> = OnceLock::new();

#[cfg(feature = "metrics")]
struct Metrics {
    requests: Counter<u64>,
    streams_inflight: UpDownCounter<i64>,
    errors: Counter<u64>,
    stream_duration: Histogram<f64>,
    shipments_flushed: Counter<u64>,
    orders_aggregated: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("requests")
                .with_description("gRPC calls accepted")
                .build(),
            streams_inflight: meter
                .i64_up_down_counter("streams_inflight")
                .with_description("Streaming calls currently running")
                .build(),
            errors: meter
                .u64_counter("errors")
                .with_description("Calls ended by an error, cancellation or deadline")
                .build(),
            stream_duration: meter
                .f64_histogram("stream_duration")
                .with_unit("ms")
                .with_description("Streaming call duration")
                .build(),
            shipments_flushed: meter
                .u64_counter("shipments_flushed")
                .with_description("Combined shipments sent by ProcessOrders")
                .build(),
            orders_aggregated: meter
                .u64_counter("orders_aggregated")
                .with_description("Orders added to a shipment window")
                .build(),
        }
    }
}

pub fn increment_requests(_method: &'static str) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.requests.add(1, &[KeyValue::new("method", _method)]);
        }
    }
}

pub fn increment_streams_inflight() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.streams_inflight.add(1, &[]);
        }
    }
}

pub fn decrement_streams_inflight() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.streams_inflight.add(-1, &[]);
        }
    }
}

pub fn increment_stream_errors() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.errors.add(1, &[]);
        }
    }
}

pub fn record_stream_duration(_duration_ms: f64) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.stream_duration.record(_duration_ms, &[]);
        }
    }
}

pub fn increment_shipments_flushed(_count: u64) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.shipments_flushed.add(_count, &[]);
        }
    }
}

pub fn increment_orders_aggregated() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.orders_aggregated.add(1, &[]);
        }
    }
}
