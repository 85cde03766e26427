// Identifier set - the user's durable, ordered list of tracked entry ids
//
// Load never fails: a missing or corrupt stored list falls back to the seed
// set. Save is best effort and only logs.

use crate::model::EntryId;
use crate::storage::{KeyValueStore, IDS_KEY};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Entry tracked on first run (Pikachu)
pub const DEFAULT_SEED_ID: EntryId = EntryId::from_const(25);

/// Ordered, duplicate-free list of ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdentifierSet {
    ids: Vec<EntryId>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry set used when nothing is stored
    pub fn seeded(seed: EntryId) -> Self {
        Self { ids: vec![seed] }
    }

    /// Builds a set keeping the first occurrence of each id
    pub fn from_ids<I: IntoIterator<Item = EntryId>>(ids: I) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.push(id);
        }
        set
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    /// Appends `id`; false if it was already present
    pub fn push(&mut self, id: EntryId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Deletes `id`; false if it was absent
    pub fn remove(&mut self, id: EntryId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| *existing != id);
        self.ids.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.ids.iter().copied()
    }

    pub fn as_slice(&self) -> &[EntryId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Parses a stored id list. Zero and duplicate ids are dropped.
pub fn parse(raw: &str) -> Result<IdentifierSet, serde_json::Error> {
    let ids: Vec<u32> = serde_json::from_str(raw)?;
    Ok(IdentifierSet::from_ids(ids.into_iter().filter_map(EntryId::new)))
}

/// Reads the tracked ids; seed set when absent or unreadable
pub fn load<S: KeyValueStore + ?Sized>(store: &S, seed: EntryId) -> IdentifierSet {
    let raw = match store.get(IDS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No saved identifier set, seeding with #{}", seed);
            return IdentifierSet::seeded(seed);
        }
        Err(e) => {
            warn!("Failed to read identifier set, seeding with #{}: {:#}", seed, e);
            return IdentifierSet::seeded(seed);
        }
    };

    match parse(&raw) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Ignoring malformed identifier set in storage: {}", e);
            IdentifierSet::seeded(seed)
        }
    }
}

/// Writes the tracked ids; failures are logged, never returned
pub fn save<S: KeyValueStore + ?Sized>(store: &S, ids: &IdentifierSet) {
    let encoded = match serde_json::to_string(ids) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to encode identifier set: {}", e);
            return;
        }
    };

    if let Err(e) = store.set(IDS_KEY, &encoded) {
        error!("Failed to persist identifier set: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn id(raw: u32) -> EntryId {
        EntryId::new(raw).unwrap()
    }

    fn seed() -> EntryId {
        DEFAULT_SEED_ID
    }

    #[test]
    fn test_push_and_remove_keep_order_without_duplicates() {
        let mut set = IdentifierSet::seeded(seed());

        assert!(set.push(id(1)));
        assert!(set.push(id(4)));
        assert!(!set.push(id(25)), "duplicate push must be rejected");
        assert_eq!(set.as_slice(), &[id(25), id(1), id(4)]);

        assert!(set.remove(id(1)));
        assert!(!set.remove(id(1)));
        assert_eq!(set.as_slice(), &[id(25), id(4)]);
    }

    #[test]
    fn test_load_absent_seeds_default() {
        let store = MemoryStore::new();
        let ids = load(&store, seed());

        assert_eq!(ids.as_slice(), &[id(25)]);
        assert_eq!(store.writes(), 0, "load must not write");
    }

    #[test]
    fn test_load_malformed_falls_back_to_seed() {
        for garbage in ["not json", "{\"a\":1}", "[1, \"two\"]", ""] {
            let store = MemoryStore::with_values([(IDS_KEY, garbage)]);
            assert_eq!(load(&store, seed()).as_slice(), &[id(25)], "input {:?}", garbage);
        }
    }

    #[test]
    fn test_load_empty_list_stays_empty() {
        let store = MemoryStore::with_values([(IDS_KEY, "[]")]);
        assert!(load(&store, seed()).is_empty());
    }

    #[test]
    fn test_load_drops_zero_and_duplicate_ids() {
        let store = MemoryStore::with_values([(IDS_KEY, "[4,0,25,4,1]")]);
        assert_eq!(load(&store, seed()).as_slice(), &[id(4), id(25), id(1)]);
    }

    #[test]
    fn test_save_load_round_trip_is_byte_identical() {
        let store = MemoryStore::with_values([(IDS_KEY, "[25,1,150]")]);

        let loaded = load(&store, seed());
        save(&store, &loaded);

        assert_eq!(store.get(IDS_KEY).unwrap().as_deref(), Some("[25,1,150]"));

        save(&store, &load(&store, seed()));
        assert_eq!(store.get(IDS_KEY).unwrap().as_deref(), Some("[25,1,150]"));
    }
}
