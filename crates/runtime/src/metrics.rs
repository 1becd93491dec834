//! Metrics collection and Prometheus export.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use vc_core::{VcError, VcResult};

/// Metrics recorder for synthesis operations.
///
/// Recording is a no-op until a recorder is installed, so the pipeline can
/// hold one of these unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct VcMetrics;

impl VcMetrics {
    /// Install the global Prometheus recorder and register descriptions.
    ///
    /// The returned handle renders the exposition text for `GET /metrics`.
    pub fn install() -> VcResult<(Self, PrometheusHandle)> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| VcError::internal(format!("metrics init failed: {e}")))?;

        Self::register_metrics();

        Ok((Self, handle))
    }

    /// Metrics without a recorder (for tests and the CLI).
    pub fn noop() -> Self {
        Self
    }

    fn register_metrics() {
        describe_counter!(
            "chattervc_requests_total",
            "Total number of synthesis requests received"
        );
        describe_counter!(
            "chattervc_requests_completed",
            "Total number of synthesis requests completed successfully"
        );
        describe_counter!(
            "chattervc_requests_failed",
            "Total number of synthesis requests that failed, by error kind"
        );

        describe_counter!(
            "chattervc_conversion_applied",
            "Requests whose conversion pass was applied"
        );
        describe_counter!(
            "chattervc_conversion_fallback",
            "Requests that fell back to unconverted audio"
        );

        describe_counter!(
            "chattervc_engine_loads",
            "Engines constructed, by engine kind"
        );
        describe_counter!(
            "chattervc_engine_load_failures",
            "Engine constructions that failed, by engine kind"
        );
        describe_gauge!(
            "chattervc_conversion_engines_loaded",
            "Number of conversion engines held by the cache"
        );

        describe_histogram!(
            "chattervc_synthesis_latency_ms",
            "Synthesis engine latency in milliseconds"
        );
        describe_histogram!(
            "chattervc_conversion_latency_ms",
            "Conversion engine latency in milliseconds"
        );
        describe_histogram!(
            "chattervc_encode_latency_ms",
            "Resampling and encoding latency in milliseconds"
        );
        describe_histogram!(
            "chattervc_total_latency_ms",
            "Total pipeline latency in milliseconds"
        );
        describe_histogram!(
            "chattervc_rtf",
            "Real-time factor (processing time / audio duration)"
        );
    }

    /// Record a new request received.
    pub fn request_received(&self) {
        counter!("chattervc_requests_total").increment(1);
    }

    /// Record a request completed successfully.
    pub fn request_completed(&self) {
        counter!("chattervc_requests_completed").increment(1);
    }

    /// Record a failed request.
    pub fn request_failed(&self, kind: &'static str) {
        counter!("chattervc_requests_failed", "kind" => kind).increment(1);
    }

    pub fn conversion_applied(&self) {
        counter!("chattervc_conversion_applied").increment(1);
    }

    pub fn conversion_fallback(&self) {
        counter!("chattervc_conversion_fallback").increment(1);
    }

    /// Record an engine construction.
    pub fn engine_loaded(&self, engine: &'static str, ms: f64) {
        counter!("chattervc_engine_loads", "engine" => engine).increment(1);
        histogram!("chattervc_engine_load_ms", "engine" => engine).record(ms);
    }

    /// Record a failed engine construction.
    pub fn engine_load_failed(&self, engine: &'static str) {
        counter!("chattervc_engine_load_failures", "engine" => engine).increment(1);
    }

    pub fn set_conversion_engines(&self, count: usize) {
        gauge!("chattervc_conversion_engines_loaded").set(count as f64);
    }

    pub fn record_synthesis_latency(&self, ms: f64) {
        histogram!("chattervc_synthesis_latency_ms").record(ms);
    }

    pub fn record_conversion_latency(&self, ms: f64) {
        histogram!("chattervc_conversion_latency_ms").record(ms);
    }

    pub fn record_encode_latency(&self, ms: f64) {
        histogram!("chattervc_encode_latency_ms").record(ms);
    }

    pub fn record_total_latency(&self, ms: f64) {
        histogram!("chattervc_total_latency_ms").record(ms);
    }

    /// Record real-time factor.
    pub fn record_rtf(&self, rtf: f64) {
        histogram!("chattervc_rtf").record(rtf);
    }
}
