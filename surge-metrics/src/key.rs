use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id used for metric names, tag keys and tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Default, Debug)]
struct Tables {
    ids: HashMap<Arc<str>, KeyId>,
    strings: Vec<Arc<str>>,
}

#[derive(Default, Debug)]
pub struct Interner {
    tables: RwLock<Tables>,
}

impl Interner {
    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.tables.read().ids.get(s).copied()
    }

    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut tables = self.tables.write();

        // Another writer may have won the race between the read and write lock.
        if let Some(&id) = tables.ids.get(s) {
            return id;
        }

        let id = KeyId(u32::try_from(tables.strings.len()).unwrap_or(u32::MAX));
        let s: Arc<str> = Arc::from(s);
        tables.strings.push(s.clone());
        tables.ids.insert(s, id);

        id
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.tables.read().strings.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
