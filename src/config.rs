// Runtime configuration - environment variables with defaults
//
// Binaries apply CLI flags on top of `TrackerConfig::from_env()`.

use crate::identifiers::DEFAULT_SEED_ID;
use crate::model::EntryId;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_CRY_BASE_URL: &str = "https://play.pokemonshowdown.com/audio/cries";
pub const DEFAULT_DATA_DIR: &str = "./dex-data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

const DB_FILE: &str = "tracker.db";
const LOG_FILE: &str = "dex-tracker.log";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub api_base_url: String,
    pub cry_base_url: String,
    pub data_dir: PathBuf,
    /// Per-lookup timeout; a hung request fails its refresh
    pub request_timeout: Duration,
    /// Run a full refresh after every successful add instead of merging
    pub refresh_on_add: bool,
    pub seed_id: EntryId,
    pub server_addr: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cry_base_url: DEFAULT_CRY_BASE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_on_add: false,
            seed_id: DEFAULT_SEED_ID,
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Reads `DEX_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DEX_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("DEX_CRY_BASE_URL") {
            config.cry_base_url = url;
        }
        if let Some(dir) = lookup("DEX_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("DEX_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("DEX_REQUEST_TIMEOUT_SECS: '{}' is not a number", secs))?;
            if secs == 0 {
                return Err(anyhow!("DEX_REQUEST_TIMEOUT_SECS must be at least 1"));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("DEX_REFRESH_ON_ADD") {
            config.refresh_on_add = parse_flag(&flag)
                .ok_or_else(|| anyhow!("DEX_REFRESH_ON_ADD: '{}' is not a boolean", flag))?;
        }
        if let Some(seed) = lookup("DEX_SEED_ID") {
            config.seed_id = seed
                .parse()
                .map_err(|e: String| anyhow!("DEX_SEED_ID: {}", e))?;
        }
        if let Some(addr) = lookup("DEX_SERVER_ADDR") {
            config.server_addr = addr;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<TrackerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TrackerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.seed_id.get(), 25);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.db_path(), PathBuf::from("./dex-data/tracker.db"));
        assert!(!config.refresh_on_add);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DEX_API_BASE_URL", "http://localhost:9000"),
            ("DEX_DATA_DIR", "/tmp/dex"),
            ("DEX_REQUEST_TIMEOUT_SECS", "3"),
            ("DEX_REFRESH_ON_ADD", "yes"),
            ("DEX_SEED_ID", "1"),
        ])
        .unwrap();

        assert_eq!(config.api_base_url, "http://localhost:9000");
        assert_eq!(config.log_path(), PathBuf::from("/tmp/dex/dex-tracker.log"));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert!(config.refresh_on_add);
        assert_eq!(config.seed_id.get(), 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("DEX_REQUEST_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("DEX_REQUEST_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("DEX_REFRESH_ON_ADD", "maybe")]).is_err());
        assert!(config_from(&[("DEX_SEED_ID", "0")]).is_err());
    }
}
