// Cached entry set - write-through copy of fetched records
//
// Stored as a plain JSON array (not keyed by id), so lookups search by id.
// Order follows the identifier set.

use crate::identifiers::IdentifierSet;
use crate::model::{CatalogEntry, EntryId};
use crate::storage::{KeyValueStore, DATA_KEY};
use serde::Serialize;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CachedEntrySet {
    entries: Vec<CatalogEntry>,
}

impl CachedEntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    pub fn get(&self, id: EntryId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    /// Replaces an entry with the same id in place, otherwise appends
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self.entries.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, id: EntryId) -> Option<CatalogEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// True when the cached ids equal the identifier set, order included
    pub fn matches(&self, ids: &IdentifierSet) -> bool {
        self.entries.len() == ids.len()
            && self.entries.iter().zip(ids.iter()).all(|(entry, id)| entry.id == id)
    }

    /// Keeps only entries whose id is tracked, in identifier order
    pub fn reconciled(mut self, ids: &IdentifierSet) -> Self {
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            if let Some(entry) = self.remove(id) {
                ordered.push(entry);
            }
        }
        if !self.entries.is_empty() {
            debug!("Dropped {} cached entries no longer tracked", self.entries.len());
        }
        Self { entries: ordered }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses a stored entry array. Entries that fail the schema or
/// validation are dropped; a non-array document is an error.
pub fn parse(raw: &str) -> Result<CachedEntrySet, serde_json::Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut set = CachedEntrySet::new();

    for value in values {
        match serde_json::from_value::<CatalogEntry>(value) {
            Ok(entry) => match entry.validate() {
                Ok(()) => set.insert(entry),
                Err(e) => warn!("Quarantined cached entry #{}: {}", entry.id, e),
            },
            Err(e) => warn!("Quarantined unreadable cached entry: {}", e),
        }
    }

    Ok(set)
}

/// Reads the cached entries; empty when absent or corrupt
pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> CachedEntrySet {
    match store.get(DATA_KEY) {
        Ok(Some(raw)) => parse(&raw).unwrap_or_else(|e| {
            warn!("Ignoring malformed entry cache in storage: {}", e);
            CachedEntrySet::new()
        }),
        Ok(None) => {
            debug!("No saved entry cache");
            CachedEntrySet::new()
        }
        Err(e) => {
            warn!("Failed to read entry cache: {:#}", e);
            CachedEntrySet::new()
        }
    }
}

/// Writes the cached entries; failures are logged, never returned
pub fn save<S: KeyValueStore + ?Sized>(store: &S, cache: &CachedEntrySet) {
    let encoded = match serde_json::to_string(cache) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to encode entry cache: {}", e);
            return;
        }
    };

    if let Err(e) = store.set(DATA_KEY, &encoded) {
        error!("Failed to persist entry cache: {:#}", e);
    }
}
