// Storage port - the key-value contract the sync layer persists through
//
// Two keys are used: `pokemonIds` (JSON list of ints) and `pokemonData`
// (JSON array of cached entries). Writes are last-write-wins.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key holding the ordered identifier list
pub const IDS_KEY: &str = "pokemonIds";

/// Key holding the cached entry array
pub const DATA_KEY: &str = "pokemonData";

/// Durable string store injected into the controller
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// In-process store; also counts writes so callers can check for no-ops
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.values = values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect();
        }
        store
    }

    /// Number of `set` calls so far
    pub fn writes(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner
            .lock()
            .map(|inner| inner.values.clone())
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(inner.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get(IDS_KEY).unwrap(), None);

        store.set(IDS_KEY, "[25]").unwrap();
        store.set(IDS_KEY, "[25,1]").unwrap();

        assert_eq!(store.get(IDS_KEY).unwrap().as_deref(), Some("[25,1]"));
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::with_values([(DATA_KEY, "[]")]);
        let other = store.clone();

        other.set(IDS_KEY, "[7]").unwrap();

        assert_eq!(store.get(IDS_KEY).unwrap().as_deref(), Some("[7]"));
        assert_eq!(store.get(DATA_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.writes(), 1);
    }
}
