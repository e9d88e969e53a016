use std::sync::atomic::Ordering;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::metrics::{
    MetricKind, MetricStorage, TrendSummary, new_trend_histogram, summarize_trend, us_to_ms,
};

/// Point-in-time aggregate of every series of one metric.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub name: String,
    pub kind: MetricKind,
    /// Counter: summed value. Rate: number of samples. Trend: number of samples.
    /// Gauge: number of series.
    pub count: u64,
    /// Counter sum or gauge sum across series.
    pub value: Option<f64>,
    /// Ratio of `true` samples, rate metrics only.
    pub rate: Option<f64>,
    pub trend: Option<TrendSnapshot>,
}

impl MetricSnapshot {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Counter throughput over `elapsed`.
    pub fn per_second(&self, elapsed: Duration) -> Option<f64> {
        if self.kind != MetricKind::Counter {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.count as f64 / secs)
    }
}

/// Merged trend histogram. Values are reported in milliseconds with at most 0.1% relative
/// error.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    hist: Histogram<u64>,
}

impl TrendSnapshot {
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    fn has_samples(&self) -> bool {
        self.hist.len() > 0
    }

    /// `p` is a percentage in `(0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if !self.has_samples() || !(p > 0.0 && p <= 100.0) {
            return None;
        }
        Some(us_to_ms(self.hist.value_at_percentile(p) as f64))
    }

    pub fn avg(&self) -> Option<f64> {
        self.has_samples().then(|| us_to_ms(self.hist.mean()))
    }

    pub fn min(&self) -> Option<f64> {
        self.has_samples().then(|| us_to_ms(self.hist.min() as f64))
    }

    pub fn max(&self) -> Option<f64> {
        self.has_samples().then(|| us_to_ms(self.hist.max() as f64))
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    pub fn summary(&self) -> TrendSummary {
        summarize_trend(&self.hist)
    }
}

pub(crate) struct SnapshotBuilder {
    name: String,
    kind: MetricKind,
    series: u64,
    counter: u64,
    gauge: i64,
    total: u64,
    hits: u64,
    hist: Option<Histogram<u64>>,
}

impl SnapshotBuilder {
    pub(crate) fn new(name: &str, kind: MetricKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            series: 0,
            counter: 0,
            gauge: 0,
            total: 0,
            hits: 0,
            hist: (kind == MetricKind::Trend).then(new_trend_histogram),
        }
    }

    pub(crate) fn add(&mut self, storage: &MetricStorage) {
        self.series = self.series.saturating_add(1);
        match storage {
            MetricStorage::Counter(c) => {
                self.counter = self.counter.saturating_add(c.load(Ordering::Relaxed));
            }
            MetricStorage::Gauge(g) => {
                self.gauge = self.gauge.saturating_add(g.load(Ordering::Relaxed));
            }
            MetricStorage::Rate(r) => {
                let (total, hits) = r.load();
                self.total = self.total.saturating_add(total);
                self.hits = self.hits.saturating_add(hits);
            }
            MetricStorage::Trend(h) => {
                if let Some(acc) = self.hist.as_mut() {
                    let h = h.lock();
                    // Both histograms share bounds, so `add` cannot overflow the range.
                    let _ = acc.add(&*h);
                }
            }
        }
    }

    pub(crate) fn finish(self) -> MetricSnapshot {
        let (count, value, rate) = match self.kind {
            MetricKind::Counter => (self.counter, Some(self.counter as f64), None),
            MetricKind::Gauge => (self.series, Some(self.gauge as f64), None),
            MetricKind::Rate => (
                self.total,
                None,
                (self.total > 0).then(|| self.hits as f64 / self.total as f64),
            ),
            MetricKind::Trend => (self.hist.as_ref().map_or(0, Histogram::len), None, None),
        };

        MetricSnapshot {
            name: self.name,
            kind: self.kind,
            count,
            value,
            rate,
            trend: self.hist.map(|hist| TrendSnapshot { hist }),
        }
    }
}
