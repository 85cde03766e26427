// Catalog entry model - strict schema for remote Pokémon records
//
// The serde shape mirrors the remote JSON (`GET /pokemon/{idOrName}`), so the
// same struct parses a fresh API body and re-reads the cached copy written to
// storage. Fields the remote sends that we do not display are ignored.

use crate::error::InvalidEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stat ceiling used to scale stat bars
pub const MAX_BASE_STAT: u32 = 255;

/// Moves listed in the detail view before collapsing into "And N more"
pub const MOVE_PREVIEW_LIMIT: usize = 10;

// ============================================================================
// IDENTITY
// ============================================================================

/// Stable external id of a catalog entry (National Dex number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(u32);

impl EntryId {
    /// Returns None for zero; ids are positive
    pub fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(EntryId(raw))
        }
    }

    /// For constants; a zero id fails const evaluation
    pub const fn from_const(raw: u32) -> Self {
        assert!(raw > 0, "entry ids are positive");
        EntryId(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u32 = s
            .trim()
            .parse()
            .map_err(|e| format!("'{}' is not an entry id: {}", s, e))?;
        EntryId::new(raw).ok_or_else(|| "entry id must be positive".to_string())
    }
}

// ============================================================================
// NESTED RECORDS
// ============================================================================

/// `{ "name": ... }` reference to another remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitySlot {
    pub ability: NamedResource,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSlot {
    /// 1 for the primary type, 2 for the secondary
    #[serde(default)]
    pub slot: u32,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatValue {
    pub stat: NamedResource,
    pub base_stat: u32,
}

impl StatValue {
    /// Bar fill in 0.0..=1.0
    pub fn fraction(&self) -> f64 {
        (self.base_stat.min(MAX_BASE_STAT) as f64) / MAX_BASE_STAT as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSlot {
    #[serde(rename = "move")]
    pub learned: NamedResource,
}

/// Image references; any of them may be null upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprites {
    #[serde(default)]
    pub front_default: Option<String>,
    #[serde(default)]
    pub back_default: Option<String>,
    #[serde(default)]
    pub front_shiny: Option<String>,
    #[serde(default)]
    pub back_shiny: Option<String>,
    #[serde(default)]
    pub front_female: Option<String>,
    #[serde(default)]
    pub back_female: Option<String>,
    #[serde(default)]
    pub front_shiny_female: Option<String>,
    #[serde(default)]
    pub back_shiny_female: Option<String>,
}

impl Sprites {
    /// Non-null sprites with their gallery labels, in display order
    pub fn gallery(&self) -> Vec<(&'static str, &str)> {
        [
            ("Front Default", &self.front_default),
            ("Back Default", &self.back_default),
            ("Front Shiny", &self.front_shiny),
            ("Back Shiny", &self.back_shiny),
            ("Front Female", &self.front_female),
            ("Back Female", &self.back_female),
            ("Front Shiny Female", &self.front_shiny_female),
            ("Back Shiny Female", &self.back_shiny_female),
        ]
        .into_iter()
        .filter_map(|(label, url)| url.as_deref().map(|u| (label, u)))
        .collect()
    }
}

// ============================================================================
// CATALOG ENTRY
// ============================================================================

/// Snapshot of one remote record. Only ever built from a complete remote
/// body (or its cached copy) and replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntryId,
    pub name: String,
    pub sprites: Sprites,

    /// Tenths of a metre
    pub height: u32,

    /// Tenths of a kilogram
    pub weight: u32,

    /// Null for a handful of forms upstream
    pub base_experience: Option<u32>,

    pub abilities: Vec<AbilitySlot>,
    pub types: Vec<TypeSlot>,
    pub stats: Vec<StatValue>,
    pub moves: Vec<MoveSlot>,
}

impl CatalogEntry {
    /// Existence checks applied at the boundary
    pub fn validate(&self) -> Result<(), InvalidEntry> {
        if self.id.get() == 0 {
            return Err(InvalidEntry::ZeroId);
        }
        if self.name.trim().is_empty() {
            return Err(InvalidEntry::EmptyName);
        }
        Ok(())
    }

    pub fn height_m(&self) -> f64 {
        self.height as f64 / 10.0
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight as f64 / 10.0
    }

    pub fn ability_names(&self) -> Vec<&str> {
        self.abilities.iter().map(|a| a.ability.name.as_str()).collect()
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.kind.name.as_str()).collect()
    }

    /// First `limit` moves and how many were left out
    pub fn move_preview(&self, limit: usize) -> (&[MoveSlot], usize) {
        let shown = self.moves.len().min(limit);
        (&self.moves[..shown], self.moves.len() - shown)
    }

    /// Audio cry location under `cry_base_url`
    pub fn cry_url(&self, cry_base_url: &str) -> String {
        format!("{}/{}.mp3", cry_base_url.trim_end_matches('/'), self.name)
    }
}
