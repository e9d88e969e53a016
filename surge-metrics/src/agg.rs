use std::collections::HashMap;
use std::sync::atomic::Ordering;

use hdrhistogram::Histogram;
use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::{MetricStorage, TrendSummary, new_trend_histogram, summarize_trend};
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Has(KeyId),
    Missing(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
            TagFilter::Missing(k) => tags.get(k).is_none(),
        }
    }
}

/// Counter value captured at one progress tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
}

impl CounterSnapshot {
    pub fn new(total: u64) -> Self {
        Self { total }
    }

    pub fn delta_since(self, prev: Option<Self>) -> u64 {
        match prev {
            Some(prev) => self.total.saturating_sub(prev.total),
            None => self.total,
        }
    }

    pub fn per_sec_since(self, prev: Option<Self>, dt_secs: f64) -> f64 {
        per_sec(self.delta_since(prev), dt_secs)
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    let dt = dt_secs.max(1e-9);
    delta as f64 / dt
}

/// Aggregated `(total, hits)` of a rate metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateTotals {
    pub total: u64,
    pub hits: u64,
}

impl RateTotals {
    pub fn misses(&self) -> u64 {
        self.total.saturating_sub(self.hits)
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

/// Filtered and grouped read over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: KeyId, value: KeyId) -> Self {
        self.filters.push(TagFilter::Eq(key, value));
        self
    }

    #[must_use]
    pub fn where_has(mut self, key: KeyId) -> Self {
        self.filters.push(TagFilter::Has(key));
        self
    }

    #[must_use]
    pub fn where_missing(mut self, key: KeyId) -> Self {
        self.filters.push(TagFilter::Missing(key));
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: impl IntoIterator<Item = KeyId>) -> Self {
        self.group_keys = keys.into_iter().collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    fn group_key(&self, tags: &TagSet) -> TagSet {
        tags.project(&self.group_keys)
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(Ordering::Relaxed);
            if v == 0 {
                return;
            }

            let k = self.group_key(tags);
            out.entry(k)
                .and_modify(|cur| *cur = cur.saturating_add(v))
                .or_insert(v);
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    pub fn sum_rate(self) -> HashMap<TagSet, RateTotals> {
        let mut out: HashMap<TagSet, RateTotals> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Rate(r) = storage else {
                return;
            };

            let (total, hits) = r.load();
            let entry = out.entry(self.group_key(tags)).or_default();
            entry.total = entry.total.saturating_add(total);
            entry.hits = entry.hits.saturating_add(hits);
        });

        out
    }

    pub fn sum_rate_total(self) -> RateTotals {
        self.sum_rate()
            .into_values()
            .fold(RateTotals::default(), |acc, r| RateTotals {
                total: acc.total.saturating_add(r.total),
                hits: acc.hits.saturating_add(r.hits),
            })
    }

    pub fn merge_trend(self) -> HashMap<TagSet, TrendSummary> {
        let mut acc: HashMap<TagSet, Histogram<u64>> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Trend(h) = storage else {
                return;
            };

            let entry = acc
                .entry(self.group_key(tags))
                .or_insert_with(new_trend_histogram);
            let h = h.lock();
            let _ = entry.add(&*h);
        });

        acc.into_iter()
            .map(|(k, h)| (k, summarize_trend(&h)))
            .collect()
    }

    /// Merges every matching series into one summary, ignoring `group_by`.
    pub fn merge_trend_total(mut self) -> TrendSummary {
        self.group_keys.clear();
        self.merge_trend()
            .into_values()
            .next()
            .unwrap_or_default()
    }
}
