use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic sum.
    Counter,
    /// Last/accumulated signed value.
    Gauge,
    /// Ratio of `true` samples over all samples.
    Rate,
    /// Distribution of durations.
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Trend statistics in milliseconds. All fields are `None` when no sample was recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// Histogram upper bound: one hour, in microseconds.
const TREND_MAX_US: u64 = 3_600_000_000;

/// Significant figures kept by trend histograms. Three figures bound the relative error of
/// any reported quantile to 0.1%.
const TREND_SIGFIG: u8 = 3;

pub(crate) fn new_trend_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, TREND_MAX_US, TREND_SIGFIG) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn duration_to_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX).max(1)
}

pub(crate) fn us_to_ms(us: f64) -> f64 {
    us / 1_000.0
}

pub(crate) fn summarize_trend(h: &Histogram<u64>) -> TrendSummary {
    let count = h.len();
    let q = |q: f64| (count > 0).then(|| us_to_ms(h.value_at_quantile(q) as f64));

    TrendSummary {
        avg: (count > 0).then(|| us_to_ms(h.mean())),
        min: (count > 0).then(|| us_to_ms(h.min() as f64)),
        med: q(0.50),
        max: (count > 0).then(|| us_to_ms(h.max() as f64)),
        p90: q(0.90),
        p95: q(0.95),
        p99: q(0.99),
        stdev: (count > 0).then(|| us_to_ms(h.stdev())),
        count,
    }
}

#[derive(Debug)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

impl Rate {
    fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Reads `(total, hits)`.
    ///
    /// `hits` is loaded first and both counters only grow, so `hits <= total` always holds
    /// for the returned pair.
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Acquire);
        (total, hits.min(total))
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::new())),
            MetricKind::Trend => MetricStorage::Trend(Arc::new(Mutex::new(new_trend_histogram()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            MetricStorage::Counter(a) => MetricValue::Counter(a.load(Ordering::Relaxed)),
            MetricStorage::Gauge(a) => MetricValue::Gauge(a.load(Ordering::Relaxed)),
            MetricStorage::Rate(r) => {
                let (total, hits) = r.load();
                let rate = (total > 0).then(|| hits as f64 / total as f64);
                MetricValue::Rate { total, hits, rate }
            }
            MetricStorage::Trend(h) => MetricValue::Trend(summarize_trend(&h.lock())),
        }
    }
}

/// Write handle for one series. Cloning is cheap and handles may be cached by producers.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_gauge(&self, delta: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Raises the gauge to `value` if it is currently lower.
    #[inline]
    pub fn max_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            // `total` goes first so a concurrent reader never observes hits > total.
            r.total.fetch_add(1, Ordering::Release);
            if hit {
                r.hits.fetch_add(1, Ordering::Release);
            }
        }
    }

    #[inline]
    pub fn observe(&self, value: Duration) {
        if let MetricHandle::Trend(h) = self {
            h.lock().saturating_record(duration_to_us(value));
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
        }
    }

    pub fn get_counter(&self) -> u64 {
        if let MetricHandle::Counter(c) = self {
            c.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn get_gauge(&self) -> i64 {
        if let MetricHandle::Gauge(g) = self {
            g.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn get_rate(&self) -> (u64, u64) {
        if let MetricHandle::Rate(r) = self {
            r.load()
        } else {
            (0, 0)
        }
    }
}
