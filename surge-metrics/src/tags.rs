use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted set of interned `(key, value)` tag pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Most series carry two or three tags (scenario, outcome, check name).
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }

    /// Builds a set from pairs in any order. Later duplicates of a key are dropped.
    pub fn from_unsorted(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = iter.into_iter().collect();
        tags.sort_by_key(|(k, _)| *k);
        tags.dedup_by_key(|(k, _)| *k);
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }

    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        if keys.is_empty() {
            return TagSet::default();
        }

        let mut out = SmallVec::<[(KeyId, KeyId); 4]>::new();
        for key in keys {
            if let Some(value) = self.get(*key) {
                out.push((*key, value));
            }
        }

        TagSet { tags: out }
    }
}
