// Synchronization controller - keeps the cached entries consistent with the
// tracked identifier set and the remote catalog
//
// Phases: Idle -> Loading -> {Ready, Failed}
//
// Every mutating operation takes `&mut self`, so one controller never runs an
// add, a remove and a refresh at the same time. Shared front-ends hold it
// behind `tokio::sync::Mutex`.

use crate::cache::{self, CachedEntrySet};
use crate::error::{AddError, FetchError, RefreshError};
use crate::identifiers::{self, IdentifierSet};
use crate::model::{CatalogEntry, EntryId};
use crate::source::{CatalogSource, LookupKey};
use crate::storage::KeyValueStore;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed(RefreshError),
}

/// What a renderer may show right now
#[derive(Debug, PartialEq)]
pub enum View<'a> {
    /// First load still running and nothing cached yet
    Loading,

    /// The initial load failed; nothing renders
    Blocked(&'a RefreshError),

    Entries {
        entries: &'a [CatalogEntry],
        refreshing: bool,
        /// A later refresh failed; entries are the last good copy
        stale: Option<&'a RefreshError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// Payload of the identifier-set-changed hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: EntryId,
    pub name: Option<String>,
    /// Identifier set after the change
    pub ids: Vec<EntryId>,
}

type Listener = Box<dyn FnMut(&ChangeEvent) + Send + Sync>;

// ============================================================================
// FAN-OUT FETCH
// ============================================================================

/// Looks up every id concurrently. All-or-nothing: the first failure is
/// returned and the lookups still in flight are dropped.
pub async fn fetch_all<C>(source: &C, ids: &IdentifierSet) -> Result<CachedEntrySet, RefreshError>
where
    C: CatalogSource + ?Sized,
{
    let lookups = ids.iter().map(|id| async move {
        let entry = source.fetch(&LookupKey::Id(id)).await?;
        if entry.id != id {
            return Err(FetchError::Malformed {
                key: id.to_string(),
                reason: format!("remote answered with entry #{}", entry.id),
            });
        }
        Ok(entry)
    });

    let entries = try_join_all(lookups)
        .await
        .map_err(|cause| RefreshError::NetworkFailure {
            total: ids.len(),
            cause,
        })?;

    Ok(CachedEntrySet::from_entries(entries))
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Read-only copy of the controller state, published after every change so
/// front-ends can render while an operation is still in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    ids: IdentifierSet,
    cache: CachedEntrySet,
    phase: Phase,
    loaded: bool,
}

impl Snapshot {
    pub fn view(&self) -> View<'_> {
        view_of(&self.phase, self.loaded, &self.ids, &self.cache)
    }

    pub fn select(&self, id: EntryId) -> Option<&CatalogEntry> {
        self.cache.get(id)
    }

    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    pub fn cache(&self) -> &CachedEntrySet {
        &self.cache
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }
}

fn view_of<'a>(
    phase: &'a Phase,
    loaded: bool,
    ids: &IdentifierSet,
    cache: &'a CachedEntrySet,
) -> View<'a> {
    match phase {
        Phase::Failed(e) if !loaded => View::Blocked(e),
        Phase::Failed(e) => View::Entries {
            entries: cache.entries(),
            refreshing: false,
            stale: Some(e),
        },
        Phase::Idle | Phase::Loading if !loaded && cache.is_empty() && !ids.is_empty() => {
            View::Loading
        }
        phase => View::Entries {
            entries: cache.entries(),
            refreshing: *phase == Phase::Loading,
            stale: None,
        },
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SyncController<S, C> {
    store: S,
    source: C,
    ids: IdentifierSet,
    cache: CachedEntrySet,
    phase: Phase,
    /// Set once a refresh has succeeded in this session
    loaded: bool,
    refresh_on_add: bool,
    listeners: Vec<Listener>,
    updates: watch::Sender<Arc<Snapshot>>,
}

impl<S, C> SyncController<S, C>
where
    S: KeyValueStore,
    C: CatalogSource,
{
    /// Loads the tracked ids and cached entries from `store`. Cached
    /// entries for ids that are no longer tracked are dropped.
    pub fn new(store: S, source: C, seed: EntryId) -> Self {
        let ids = identifiers::load(&store, seed);
        let cache = cache::load(&store).reconciled(&ids);

        debug!(
            "Controller loaded {} tracked ids, {} cached entries",
            ids.len(),
            cache.len()
        );

        let (updates, _) = watch::channel(Arc::new(Snapshot {
            ids: ids.clone(),
            cache: cache.clone(),
            phase: Phase::Idle,
            loaded: false,
        }));

        Self {
            store,
            source,
            ids,
            cache,
            phase: Phase::Idle,
            loaded: false,
            refresh_on_add: false,
            listeners: Vec::new(),
            updates,
        }
    }

    /// Re-run a full refresh after each add instead of merging the fetched entry
    pub fn with_refresh_on_add(mut self, enabled: bool) -> Self {
        self.refresh_on_add = enabled;
        self
    }

    /// Registers an identifier-set-changed listener. Called exactly once per
    /// successful add or remove.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ChangeEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Receiver of state snapshots; never waits on an operation in flight
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }

    /// Initial load
    pub async fn mount(&mut self) -> Result<(), RefreshError> {
        self.refresh_all().await.map(|_| ())
    }

    /// Re-fetches every tracked entry. On success the cache is replaced
    /// and persisted; on failure it is left exactly as it was.
    pub async fn refresh_all(&mut self) -> Result<&CachedEntrySet, RefreshError> {
        self.set_phase(Phase::Loading);
        info!("Refreshing {} tracked entries", self.ids.len());

        match fetch_all(&self.source, &self.ids).await {
            Ok(fresh) => {
                self.cache = fresh;
                cache::save(&self.store, &self.cache);
                self.loaded = true;
                self.set_phase(Phase::Ready);
                info!("Refresh complete: {} entries", self.cache.len());
                Ok(&self.cache)
            }
            Err(e) => {
                warn!("Refresh failed, keeping previous entries: {}", e);
                self.set_phase(Phase::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Looks `name` up remotely and starts tracking it. The fetched record
    /// is merged directly; no refresh runs unless configured.
    ///
    /// Tracked ids that have no cached entry yet (nothing loaded in this
    /// session) are fetched first, so the merge never persists an id
    /// without its entry.
    pub async fn add_by_name(&mut self, name: &str) -> Result<CatalogEntry, AddError> {
        let key = LookupKey::name(name).ok_or(AddError::EmptyName)?;

        let previous = self.phase.clone();
        self.set_phase(Phase::Loading);
        let result = self.fetch_for_add(&key).await;
        self.set_phase(previous);

        let (entry, missing) = result?;

        for loaded in missing {
            self.cache.insert(loaded);
        }
        self.ids.push(entry.id);
        self.cache.insert(entry.clone());
        self.cache = std::mem::take(&mut self.cache).reconciled(&self.ids);
        self.persist();
        self.publish();
        info!("Tracking {} (#{})", entry.name, entry.id);

        self.notify(ChangeEvent {
            kind: ChangeKind::Added,
            id: entry.id,
            name: Some(entry.name.clone()),
            ids: self.ids.as_slice().to_vec(),
        });

        // The entry is tracked either way; a failure shows up as stale data
        if self.refresh_on_add {
            if let Err(e) = self.refresh_all().await {
                warn!("Refresh after adding {} failed: {}", entry.name, e);
            }
        }

        Ok(entry)
    }

    /// Remote half of an add: the named entry plus any tracked entries
    /// missing from the cache. Changes no state.
    async fn fetch_for_add(
        &self,
        key: &LookupKey,
    ) -> Result<(CatalogEntry, Vec<CatalogEntry>), AddError> {
        let entry = self.source.fetch(key).await.map_err(|e| {
            info!("Add of '{}' failed: {}", key, e);
            AddError::from(e)
        })?;

        if self.ids.contains(entry.id) {
            info!("{} (#{}) is already tracked", entry.name, entry.id);
            return Err(AddError::AlreadyTracked(Box::new(entry)));
        }

        let missing =
            IdentifierSet::from_ids(self.ids.iter().filter(|id| !self.cache.contains(*id)));
        if missing.is_empty() {
            return Ok((entry, Vec::new()));
        }

        debug!("Loading {} tracked entries missing from the cache", missing.len());
        let loaded = fetch_all(&self.source, &missing).await?;
        Ok((entry, loaded.into_entries()))
    }

    /// Stops tracking `id`. Returns false (and writes nothing) when it was
    /// not tracked.
    pub fn remove(&mut self, id: EntryId) -> bool {
        if !self.ids.remove(id) {
            debug!("Remove of untracked #{} ignored", id);
            return false;
        }

        let removed = self.cache.remove(id);
        self.persist();
        self.publish();
        info!("Stopped tracking #{}", id);

        self.notify(ChangeEvent {
            kind: ChangeKind::Removed,
            id,
            name: removed.map(|entry| entry.name),
            ids: self.ids.as_slice().to_vec(),
        });

        true
    }

    /// Cached entry for the detail view; never fetches
    pub fn select(&self, id: EntryId) -> Option<&CatalogEntry> {
        self.cache.get(id)
    }

    pub fn view(&self) -> View<'_> {
        view_of(&self.phase, self.loaded, &self.ids, &self.cache)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    pub fn cache(&self) -> &CachedEntrySet {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.updates.send_replace(Arc::new(Snapshot {
            ids: self.ids.clone(),
            cache: self.cache.clone(),
            phase: self.phase.clone(),
            loaded: self.loaded,
        }));
    }

    fn persist(&self) {
        identifiers::save(&self.store, &self.ids);
        cache::save(&self.store, &self.cache);
    }

    fn notify(&mut self, event: ChangeEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}
