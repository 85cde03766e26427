// Transient user notices for add/remove/refresh outcomes

use crate::error::{AddError, RefreshError};
use crate::model::CatalogEntry;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notice {
    fn new(title: &str, description: String, variant: Variant) -> Self {
        Self {
            title: title.to_string(),
            description,
            variant,
        }
    }

    pub fn added(entry: &CatalogEntry) -> Self {
        Notice::new(
            "Pokémon Added",
            format!("{} has been added to the list.", entry.name),
            Variant::Default,
        )
    }

    pub fn removed() -> Self {
        Notice::new(
            "Pokémon Removed",
            "The Pokémon has been removed from your list.".to_string(),
            Variant::Default,
        )
    }

    /// Already-tracked is a notice, not an error state
    pub fn from_add_error(err: &AddError) -> Self {
        match err {
            AddError::AlreadyTracked(entry) => Notice::new(
                "Pokémon Already in List",
                format!("{} is already in your list.", entry.name),
                Variant::Destructive,
            ),
            AddError::RefreshFailed(e) => Notice::refresh_failed(e),
            AddError::EmptyName | AddError::NotFound(_) | AddError::NetworkFailure(_) => {
                Notice::new(
                    "Error",
                    "Failed to add Pokémon. Please check the name and try again.".to_string(),
                    Variant::Destructive,
                )
            }
        }
    }

    pub fn refresh_failed(_err: &RefreshError) -> Self {
        Notice::new(
            "Error",
            "Failed to fetch Pokémon data".to_string(),
            Variant::Destructive,
        )
    }

    pub fn from_add_result(result: &Result<CatalogEntry, AddError>) -> Self {
        match result {
            Ok(entry) => Notice::added(entry),
            Err(e) => Notice::from_add_error(e),
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.variant == Variant::Destructive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::fixtures::pikachu;

    #[test]
    fn test_added_and_duplicate_wording() {
        let p = pikachu();

        let added = Notice::added(&p);
        assert_eq!(added.title, "Pokémon Added");
        assert_eq!(added.description, "pikachu has been added to the list.");
        assert!(!added.is_destructive());

        let dup = Notice::from_add_error(&AddError::AlreadyTracked(Box::new(p)));
        assert_eq!(dup.title, "Pokémon Already in List");
        assert_eq!(dup.description, "pikachu is already in your list.");
        assert!(dup.is_destructive());
    }

    #[test]
    fn test_failures_share_generic_wording() {
        let not_found = Notice::from_add_result(&Err(AddError::NotFound("agumon".to_string())));
        let network = Notice::from_add_error(&AddError::NetworkFailure(FetchError::Transport {
            key: "agumon".to_string(),
            reason: "dns".to_string(),
        }));

        assert_eq!(not_found, network);
        assert_eq!(not_found.title, "Error");
        assert!(not_found.is_destructive());
    }

    #[test]
    fn test_removed_wording() {
        assert_eq!(
            Notice::removed().description,
            "The Pokémon has been removed from your list."
        );
    }
}
