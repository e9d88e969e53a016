use std::time::{Duration, Instant};

use crate::metrics::MetricKind;

/// The measured value carried by a [`Sample`]. The variant decides the metric kind the
/// sample is folded into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Duration(Duration),
    Count(u64),
    Bool(bool),
    Gauge(i64),
}

impl SampleValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleValue::Duration(_) => MetricKind::Trend,
            SampleValue::Count(_) => MetricKind::Counter,
            SampleValue::Bool(_) => MetricKind::Rate,
            SampleValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// One immutable measurement.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: String,
    pub value: SampleValue,
    pub tags: Vec<(String, String)>,
    pub timestamp: Instant,
}

impl Sample {
    pub fn new(metric: impl Into<String>, value: SampleValue) -> Self {
        Self {
            metric: metric.into(),
            value,
            tags: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}
