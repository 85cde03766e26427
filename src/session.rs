// Wires the production controller: SQLite storage, PokeAPI source and the
// audit log listener.

use crate::config::TrackerConfig;
use crate::controller::SyncController;
use crate::db::{Event, SqliteStore};
use crate::source::HttpCatalogSource;
use anyhow::{Context, Result};
use tracing::{error, info};

pub type Tracker = SyncController<SqliteStore, HttpCatalogSource>;

/// Opens the tracker described by `config`. `actor` is recorded on every
/// audit event ("cli", "tui", "server").
pub fn open_tracker(config: &TrackerConfig, actor: &str) -> Result<Tracker> {
    let db_path = config.db_path();
    let store = SqliteStore::open(&db_path)?;
    let source = HttpCatalogSource::from_config(config).context("Failed to build HTTP client")?;
    info!("Opened tracker database {}", db_path.display());

    let audit = store.clone();
    let actor = actor.to_string();

    let mut tracker = SyncController::new(store, source, config.seed_id)
        .with_refresh_on_add(config.refresh_on_add);
    tracker.subscribe(move |change| {
        if let Err(e) = audit.record_event(&Event::from_change(change, &actor)) {
            error!("Failed to record audit event: {:#}", e);
        }
    });

    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tracker_creates_database_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            data_dir: dir.path().join("data"),
            ..TrackerConfig::default()
        };

        let tracker = open_tracker(&config, "test").unwrap();

        assert!(config.db_path().exists());
        assert_eq!(tracker.ids().as_slice(), &[config.seed_id]);
        assert!(tracker.cache().is_empty());
    }

    #[test]
    fn test_remove_is_recorded_in_audit_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            data_dir: dir.path().to_path_buf(),
            ..TrackerConfig::default()
        };

        let mut tracker = open_tracker(&config, "test").unwrap();
        assert!(tracker.remove(config.seed_id));

        let events = tracker.store().recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "pokemon_removed");
        assert_eq!(events[0].actor, "test");
        assert_eq!(events[0].data["tracked_ids"], serde_json::json!([]));
    }
}
