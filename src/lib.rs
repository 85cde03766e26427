// Dex Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod cache;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod identifiers;
pub mod logging;
pub mod model;
pub mod notice;
pub mod session;
pub mod source;
pub mod storage;

// Re-export commonly used types
pub use cache::CachedEntrySet;
pub use config::TrackerConfig;
pub use controller::{fetch_all, ChangeEvent, ChangeKind, Phase, Snapshot, SyncController, View};
pub use db::{Event, SqliteStore};
pub use error::{AddError, FetchError, InvalidEntry, RefreshError};
pub use identifiers::{IdentifierSet, DEFAULT_SEED_ID};
pub use model::{CatalogEntry, EntryId, Sprites, MOVE_PREVIEW_LIMIT};
pub use notice::{Notice, Variant};
pub use session::{open_tracker, Tracker};
pub use source::{CatalogSource, HttpCatalogSource, LookupKey};
pub use storage::{KeyValueStore, MemoryStore, DATA_KEY, IDS_KEY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
