use std::collections::BTreeMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};

pub type Snapshot<T> = Arc<BTreeMap<String, Arc<T>>>;

/// Copy-on-write name map.
///
/// Readers clone the current `Arc` and keep a consistent view for as long
/// as they hold it; writers copy the map, modify the copy and swap it in.
pub struct Registry<T> {
    label: &'static str,
    entries: RwLock<Snapshot<T>>,
}

impl<T> Registry<T> {
    pub fn new(label: &'static str) -> Self {
        Registry { label, entries: RwLock::new(Arc::new(BTreeMap::new())) }
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.entries.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    /// Looks a name up, failing with a not-found schema error.
    pub fn require(&self, name: &str) -> Result<Arc<T>> {
        self.get(name)
            .ok_or_else(|| Error::not_found(format!("{} '{}' not found", self.label, name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Builds and inserts an entry under the write lock so two creators of
    /// the same name cannot both succeed.
    pub fn insert_with<F>(&self, name: &str, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(Error::conflict(format!("{} '{}' already exists", self.label, name)));
        }
        let entry = Arc::new(build()?);
        Arc::make_mut(&mut entries).insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn remove(&self, name: &str) -> Result<Arc<T>> {
        let mut entries = self.entries.write();
        if !entries.contains_key(name) {
            return Err(Error::not_found(format!("{} '{}' not found", self.label, name)));
        }
        Arc::make_mut(&mut entries)
            .remove(name)
            .ok_or_else(|| Error::internal("registry entry vanished under write lock"))
    }

    /// Empties the registry, returning what it held.
    pub fn drain(&self) -> Vec<Arc<T>> {
        let mut entries = self.entries.write();
        let old = std::mem::replace(&mut *entries, Arc::new(BTreeMap::new()));
        old.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
