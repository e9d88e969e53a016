use std::sync::Arc;
use std::time::Duration;

use surge_http::HttpExchange;
use surge_metrics::{MetricKind, Registry};

use crate::iteration_metrics::{IterationMetricIds, IterationOutcome, IterationSample};
use crate::request_metrics::{RequestMetricIds, RequestSample};

/// The run-wide metrics sink together with the cached ids of every built-in metric.
///
/// Every sample recorded through this context carries the `scenario` tag.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    registry: Arc<Registry>,
    scenario: Arc<str>,
    request: RequestMetricIds,
    iteration: IterationMetricIds,
}

impl MetricsContext {
    #[must_use]
    pub fn new(registry: Arc<Registry>, scenario: Arc<str>) -> Self {
        let request = RequestMetricIds::register(&registry);
        let iteration = IterationMetricIds::register(&registry);
        Self {
            registry,
            scenario,
            request,
            iteration,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        self.scenario.as_ref()
    }

    pub fn request_ids(&self) -> &RequestMetricIds {
        &self.request
    }

    pub fn iteration_ids(&self) -> &IterationMetricIds {
        &self.iteration
    }

    pub fn record_exchange(&self, method: &str, exchange: &HttpExchange) {
        let error_kind = exchange.error.map(|k| k.to_string());
        self.request.record_request(
            &self.registry,
            RequestSample {
                scenario: self.scenario(),
                method,
                status: exchange.status,
                failed: exchange.is_failed(),
                duration: exchange.elapsed,
                bytes_sent: exchange.bytes_sent,
                bytes_received: exchange.bytes_received,
                error_kind: error_kind.as_deref(),
            },
        );
    }

    pub fn record_iteration(
        &self,
        outcome: IterationOutcome,
        duration: Option<Duration>,
        reason: Option<&str>,
    ) {
        self.iteration.record_iteration(
            &self.registry,
            IterationSample {
                scenario: self.scenario(),
                outcome,
                duration,
                reason,
            },
        );
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        self.iteration
            .record_check(&self.registry, self.scenario(), name, passed);
    }

    pub fn set_vus(&self, active: u64) {
        self.iteration.set_vus(&self.registry, self.scenario(), active);
    }

    pub fn record_scheduler_lag(&self) {
        self.iteration
            .record_scheduler_lag(&self.registry, self.scenario());
    }

    /// Records into a user-defined metric. Returns `false` when `name` already exists with
    /// another kind; the sample is dropped in that case.
    pub fn record_custom(
        &self,
        name: &str,
        kind: MetricKind,
        tags: &[(&str, &str)],
        apply: impl FnOnce(&surge_metrics::MetricHandle),
    ) -> bool {
        let Some(id) = self.registry.register_checked(name, kind) else {
            return false;
        };

        let mut all: Vec<(&str, &str)> = Vec::with_capacity(tags.len() + 1);
        all.push(("scenario", self.scenario()));
        all.extend(tags.iter().filter(|(k, _)| *k != "scenario").copied());

        let tags = self.registry.resolve_tags(&all);
        match self.registry.get_handle(id, tags) {
            Some(h) => {
                apply(&h);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_metrics_are_scenario_tagged_and_kind_checked() {
        let ctx = MetricsContext::new(Arc::new(Registry::default()), Arc::from("readers"));

        assert!(ctx.record_custom("logins", MetricKind::Counter, &[], |h| h.increment(2)));
        assert!(!ctx.record_custom("logins", MetricKind::Rate, &[], |h| h.add_rate(true)));

        let series = ctx.registry().summarize();
        let logins: Vec<_> = series.iter().filter(|s| s.name == "logins").collect();
        assert_eq!(logins.len(), 1);
        assert_eq!(
            logins[0].tags,
            vec![("scenario".to_string(), "readers".to_string())]
        );
    }

    #[test]
    fn transport_errors_are_tagged_with_their_kind() {
        let ctx = MetricsContext::new(Arc::new(Registry::default()), Arc::from("default"));
        let ex = HttpExchange::transport_error(
            surge_http::HttpTransportErrorKind::Timeout,
            Duration::from_millis(50),
            64,
        );
        ctx.record_exchange("GET", &ex);

        let reg = ctx.registry();
        let kind = reg.resolve_key("error_kind");
        let timeout = reg.resolve_key("timeout");
        assert_eq!(
            reg.query(ctx.request_ids().http_req_errors)
                .where_eq(kind, timeout)
                .sum_counter_total(),
            1
        );
        assert_eq!(reg.snapshot("http_req_failed").and_then(|s| s.rate), Some(1.0));
    }
}
