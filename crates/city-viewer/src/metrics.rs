use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Prometheus collectors for the polling loop.
///
/// Wrapped in an `Arc` and shared between the controller and the metrics
/// server task.
pub struct ViewerMetrics {
    pub registry: Registry,
    /// Poll attempts that were actually started.
    pub polls_started_total: IntCounter,
    /// Polls whose snapshot was published.
    pub polls_succeeded_total: IntCounter,
    /// Polls that ended without publishing, by failure kind.
    pub polls_failed_total: IntCounterVec,
    /// Ticks that did not start a poll, by reason.
    pub ticks_skipped_total: IntCounterVec,
    /// Wall time of each world request, successful or not.
    pub fetch_duration_seconds: Histogram,
    /// Customers in the currently published snapshot.
    pub snapshot_customers: IntGauge,
    /// Cars in the currently published snapshot.
    pub snapshot_cars: IntGauge,
}

impl ViewerMetrics {
    /// Creates the collectors and registers them in a private registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("city_viewer".into()), None)?;

        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric;
                registry.register(Box::new(collector.clone()))?;
                collector
            }};
        }

        Ok(Self {
            polls_started_total: reg!(IntCounter::new(
                "polls_started_total",
                "Total number of world requests started"
            )?),
            polls_succeeded_total: reg!(IntCounter::new(
                "polls_succeeded_total",
                "Total number of world snapshots published"
            )?),
            polls_failed_total: reg!(IntCounterVec::new(
                Opts::new("polls_failed_total", "Total number of failed world requests"),
                &["kind"]
            )?),
            ticks_skipped_total: reg!(IntCounterVec::new(
                Opts::new("ticks_skipped_total", "Render ticks that did not start a poll"),
                &["reason"]
            )?),
            fetch_duration_seconds: reg!(Histogram::with_opts(HistogramOpts::new(
                "fetch_duration_seconds",
                "Duration of world requests"
            ))?),
            snapshot_customers: reg!(IntGauge::new(
                "snapshot_customers",
                "Customers in the published snapshot"
            )?),
            snapshot_cars: reg!(IntGauge::new(
                "snapshot_cars",
                "Cars in the published snapshot"
            )?),
            registry,
        })
    }

    /// Creates an `axum::Router` that serves the metrics on `/metrics`.
    pub fn router(&self) -> Router {
        let registry = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let mut buffer = Vec::new();
                    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
                        tracing::error!(error = %e, "Failed to encode metrics");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                    String::from_utf8_lossy(&buffer).into_owned().into_response()
                }
            }),
        )
    }

    pub fn record_snapshot(&self, customers: usize, cars: usize) {
        self.snapshot_customers.set(customers as i64);
        self.snapshot_cars.set(cars as i64);
    }
}
