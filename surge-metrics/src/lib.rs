//! Thread-safe metrics sink for load runs.
//!
//! Samples are folded into per-series aggregates as they arrive: counters, gauges and rates
//! are plain atomics, trends are HDR histograms behind a per-series lock. Raw samples are
//! never retained, so memory is bounded by the number of distinct (metric, tags) series.

pub mod agg;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod sample;
pub mod snapshot;
pub mod tags;

pub use agg::{CounterSnapshot, Query, RateTotals, per_sec};
pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, TrendSummary};
pub use registry::{MetricId, Registry};
pub use sample::{Sample, SampleValue};
pub use snapshot::{MetricSnapshot, TrendSnapshot};
pub use tags::TagSet;
