use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

/// Built-in HTTP metric names.
pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";

#[derive(Debug, Clone, Copy)]
pub struct RequestMetricIds {
    pub http_reqs: MetricId,
    pub http_req_duration: MetricId,
    pub http_req_failed: MetricId,
    pub http_req_errors: MetricId,
    pub data_sent: MetricId,
    pub data_received: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub scenario: &'a str,
    pub method: &'a str,
    pub status: u16,
    /// Transport error or a status outside `200..=399`.
    pub failed: bool,
    pub duration: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_kind: Option<&'a str>,
}

impl RequestMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            http_reqs: metrics.register(HTTP_REQS, MetricKind::Counter),
            http_req_duration: metrics.register(HTTP_REQ_DURATION, MetricKind::Trend),
            http_req_failed: metrics.register(HTTP_REQ_FAILED, MetricKind::Rate),
            http_req_errors: metrics.register(HTTP_REQ_ERRORS, MetricKind::Counter),
            data_sent: metrics.register(DATA_SENT, MetricKind::Counter),
            data_received: metrics.register(DATA_RECEIVED, MetricKind::Counter),
        }
    }

    pub fn record_request(&self, metrics: &Registry, sample: RequestSample<'_>) {
        let status = sample.status.to_string();
        let tags = metrics.resolve_tags(&[
            ("scenario", sample.scenario),
            ("method", sample.method),
            ("status", status.as_str()),
        ]);

        let handle = |id: MetricId| metrics.get_handle(id, tags.clone());

        if let Some(h) = handle(self.http_reqs) {
            h.increment(1);
        }
        if let Some(h) = handle(self.http_req_duration) {
            h.observe(sample.duration);
        }
        if let Some(h) = handle(self.http_req_failed) {
            h.add_rate(sample.failed);
        }

        // Byte counters are scenario-scoped only; nothing breaks them down further.
        let scenario_tags = metrics.resolve_tags(&[("scenario", sample.scenario)]);
        if let Some(h) = metrics.get_handle(self.data_sent, scenario_tags.clone()) {
            h.increment(sample.bytes_sent);
        }
        if let Some(h) = metrics.get_handle(self.data_received, scenario_tags) {
            h.increment(sample.bytes_received);
        }

        if let Some(kind) = sample.error_kind {
            let tags =
                metrics.resolve_tags(&[("scenario", sample.scenario), ("error_kind", kind)]);
            if let Some(h) = metrics.get_handle(self.http_req_errors, tags) {
                h.increment(1);
            }
        }
    }
}
