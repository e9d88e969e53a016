use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::agg::Query;
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage};
use crate::sample::{Sample, SampleValue};
use crate::snapshot::{MetricSnapshot, SnapshotBuilder};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// The metrics sink shared by every virtual user of a run.
///
/// Metric definitions are append-only and series are never removed, so every aggregate read
/// from the registry is monotonic over time.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    by_name: DashMap<KeyId, MetricId>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name` as a metric of `kind`, returning its id.
    ///
    /// The first registration wins: registering an existing name returns the existing id
    /// even if `kind` differs. Use [`Registry::register_checked`] to detect that.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        match self.register_inner(name, kind) {
            Ok(id) | Err(id) => id,
        }
    }

    /// Like [`Registry::register`], but returns `None` if `name` already exists with another
    /// kind.
    pub fn register_checked(&self, name: &str, kind: MetricKind) -> Option<MetricId> {
        self.register_inner(name, kind).ok()
    }

    fn register_inner(&self, name: &str, kind: MetricKind) -> Result<MetricId, MetricId> {
        let name_id = self.interner.get_or_intern(name);

        if let Some(id) = self.by_name.get(&name_id).map(|e| *e.value()) {
            return self.check_kind(id, kind);
        }

        let mut defs = self.defs.write();
        if let Some(id) = self.by_name.get(&name_id).map(|e| *e.value()) {
            drop(defs);
            return self.check_kind(id, kind);
        }

        let id = MetricId(u32::try_from(defs.len()).unwrap_or(u32::MAX));
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        self.by_name.insert(name_id, id);
        Ok(id)
    }

    fn check_kind(&self, id: MetricId, kind: MetricKind) -> Result<MetricId, MetricId> {
        match self.kind_of(id) {
            Some(existing) if existing == kind => Ok(id),
            _ => Err(id),
        }
    }

    fn kind_of(&self, id: MetricId) -> Option<MetricKind> {
        self.defs.read().get(id.0 as usize).map(|d| d.kind)
    }

    pub fn lookup_metric(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let id = self.by_name.get(&name_id).map(|e| *e.value())?;
        Some((id, self.kind_of(id)?))
    }

    pub fn metric_names(&self) -> Vec<String> {
        let defs = self.defs.read();
        let mut names: Vec<String> = defs
            .iter()
            .filter_map(|d| self.interner.resolve(d.name).map(|s| s.to_string()))
            .collect();
        names.sort();
        names
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_key_id(&self, id: KeyId) -> Option<Arc<str>> {
        self.interner.resolve(id)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_unsorted(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    fn resolve_owned_tags(&self, tags: &[(String, String)]) -> TagSet {
        TagSet::from_unsorted(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    /// Returns the write handle for one series, creating the series on first use.
    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        // `defs` must not be locked while a `storage` guard is held: `register_inner` takes
        // them in the opposite order.
        let kind = self.kind_of(metric)?;
        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        let storage = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    /// Folds one sample into its series.
    ///
    /// Returns `false` if the sample was dropped because its metric name is already
    /// registered with a different kind.
    pub fn record(&self, sample: &Sample) -> bool {
        let Some(id) = self.register_checked(&sample.metric, sample.kind()) else {
            return false;
        };
        let tags = self.resolve_owned_tags(&sample.tags);
        let Some(handle) = self.get_handle(id, tags) else {
            return false;
        };

        match sample.value {
            SampleValue::Duration(d) => handle.observe(d),
            SampleValue::Count(n) => handle.increment(n),
            SampleValue::Bool(hit) => handle.add_rate(hit),
            SampleValue::Gauge(v) => handle.set_gauge(v),
        }
        true
    }

    /// Aggregates every series of `name`. `None` if the metric was never registered.
    pub fn snapshot(&self, name: &str) -> Option<MetricSnapshot> {
        let (id, kind) = self.lookup_metric(name)?;
        let mut builder = SnapshotBuilder::new(name, kind);
        self.visit_series(id, |_, storage| builder.add(storage));
        Some(builder.finish())
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(
        &self,
        metric: MetricId,
        mut f: impl FnMut(&TagSet, &MetricStorage),
    ) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for series in series_map.iter() {
            f(series.key(), series.value());
        }
    }

    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::new();
        let defs: Vec<(MetricId, KeyId, MetricKind)> = self
            .defs
            .read()
            .iter()
            .enumerate()
            .map(|(idx, d)| (MetricId(idx as u32), d.name, d.kind))
            .collect();

        for (id, name, kind) in defs {
            let name = self
                .interner
                .resolve(name)
                .map(|s| s.to_string())
                .unwrap_or_default();

            self.visit_series(id, |tags, storage| {
                let tags = tags
                    .iter()
                    .map(|(k, v)| {
                        (
                            self.interner
                                .resolve(k)
                                .map(|s| s.to_string())
                                .unwrap_or_default(),
                            self.interner
                                .resolve(v)
                                .map(|s| s.to_string())
                                .unwrap_or_default(),
                        )
                    })
                    .collect();

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind,
                    tags,
                    values: storage.value(),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}
