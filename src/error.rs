// Error kinds for the sync layer
//
// NotFound / AlreadyTracked are user notices, NetworkFailure is the only
// fault a front-end has to render. MalformedStorage never leaves the
// storage modules (it is logged and replaced by defaults there).

use crate::model::{CatalogEntry, EntryId};
use thiserror::Error;

/// Why a remote record was rejected at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEntry {
    #[error("id must be a positive integer")]
    ZeroId,

    #[error("name is empty")]
    EmptyName,
}

/// Failure of a single remote lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Remote answered with a non-2xx status
    #[error("no catalog entry for '{key}' (HTTP {status})")]
    NotFound { key: String, status: u16 },

    /// Connection refused, DNS, TLS, timeout...
    #[error("request for '{key}' failed: {reason}")]
    Transport { key: String, reason: String },

    /// 2xx with a body that does not match the entry schema
    #[error("malformed body for '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("invalid entry for '{key}': {source}")]
    Invalid {
        key: String,
        #[source]
        source: InvalidEntry,
    },
}

impl FetchError {
    pub fn key(&self) -> &str {
        match self {
            FetchError::NotFound { key, .. }
            | FetchError::Transport { key, .. }
            | FetchError::Malformed { key, .. }
            | FetchError::Invalid { key, .. } => key,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Failure of a full refresh. Any failed lookup fails the batch, a
/// non-2xx included.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("failed to fetch {total} tracked entries: {cause}")]
    NetworkFailure {
        total: usize,
        #[source]
        cause: FetchError,
    },
}

impl RefreshError {
    pub fn cause(&self) -> &FetchError {
        match self {
            RefreshError::NetworkFailure { cause, .. } => cause,
        }
    }
}

/// Outcome of `add_by_name` other than success
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddError {
    #[error("no name given")]
    EmptyName,

    #[error("no catalog entry named '{0}'")]
    NotFound(String),

    /// The fetched entry is already in the identifier set; nothing changed
    #[error("{} (#{}) is already tracked", .0.name, .0.id)]
    AlreadyTracked(Box<CatalogEntry>),

    #[error(transparent)]
    NetworkFailure(FetchError),

    /// Tracked entries missing from the cache could not be loaded before
    /// the merge; nothing changed
    #[error("could not load tracked entries: {0}")]
    RefreshFailed(#[from] RefreshError),
}

impl AddError {
    pub fn already_tracked_id(&self) -> Option<EntryId> {
        match self {
            AddError::AlreadyTracked(entry) => Some(entry.id),
            _ => None,
        }
    }
}

impl From<FetchError> for AddError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { key, .. } => AddError::NotFound(key),
            other => AddError::NetworkFailure(other),
        }
    }
}
