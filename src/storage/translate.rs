use std::collections::HashMap;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};

#[derive(Debug, Default)]
struct TranslateMaps {
    ids: HashMap<String, u64>,
    keys: HashMap<u64, String>,
    last_id: u64,
}

/// Bidirectional string key <-> integer id map. Ids are allocated
/// sequentially starting at 1.
#[derive(Debug, Default)]
pub struct TranslateStore {
    maps: RwLock<TranslateMaps>,
}

impl TranslateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `key`, allocating one on first sight.
    pub fn translate_key(&self, key: &str) -> u64 {
        if let Some(&id) = self.maps.read().ids.get(key) {
            return id;
        }
        let mut maps = self.maps.write();
        if let Some(&id) = maps.ids.get(key) {
            return id;
        }
        maps.last_id += 1;
        let id = maps.last_id;
        maps.ids.insert(key.to_string(), id);
        maps.keys.insert(id, key.to_string());
        id
    }

    /// Id for an existing key; reads never allocate.
    pub fn find_id(&self, key: &str) -> Option<u64> {
        self.maps.read().ids.get(key).copied()
    }

    pub fn key_of(&self, id: u64) -> Option<String> {
        self.maps.read().keys.get(&id).cloned()
    }

    /// Keys for a batch of ids; unknown ids fall back to their decimal form.
    pub fn keys_of(&self, ids: &[u64]) -> Vec<String> {
        let maps = self.maps.read();
        ids.iter()
            .map(|id| maps.keys.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.maps.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(key, id)` pairs ordered by id.
    pub fn entries(&self) -> Vec<(String, u64)> {
        let maps = self.maps.read();
        let mut entries: Vec<(String, u64)> =
            maps.ids.iter().map(|(key, &id)| (key.clone(), id)).collect();
        entries.sort_by_key(|&(_, id)| id);
        entries
    }

    pub fn restore(&self, entries: &[(String, u64)]) -> Result<()> {
        let mut maps = TranslateMaps::default();
        for (key, id) in entries {
            if *id == 0 || maps.keys.insert(*id, key.clone()).is_some() {
                return Err(Error::invalid(format!("invalid or duplicate key id {}", id)));
            }
            maps.ids.insert(key.clone(), *id);
            maps.last_id = maps.last_id.max(*id);
        }
        if maps.ids.len() != maps.keys.len() {
            return Err(Error::invalid("duplicate key in translation table"));
        }
        *self.maps.write() = maps;
        Ok(())
    }
}
