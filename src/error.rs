use thiserror::Error;

/// Every failure the grid engine can report.
///
/// None of these are fatal: route handlers turn them into transient notices
/// and leave the in-memory state as it was (or, for save failures, as the
/// optimistic update left it).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("unknown character `{id}`")]
    UnknownCharacter { id: String },

    #[error("`{asset}` is not a skin of `{id}`")]
    UnknownSkin { id: String, asset: String },

    #[error("unknown filter `{dimension}`")]
    UnknownFilter { dimension: String },

    #[error("filter `{dimension}` has no value `{value}`")]
    UnknownFilterValue { dimension: String, value: String },

    #[error("filter `{dimension}` is a group filter and needs a value to toggle")]
    FilterValueRequired { dimension: String },

    #[error("invalid reorder: {0}")]
    InvalidReorder(String),

    #[error("invalid profile document: {0}")]
    InvalidImportDocument(String),

    #[error("malformed character catalog: {0}")]
    MalformedCatalog(String),

    #[error("malformed filter preferences: {0}")]
    MalformedFilterPreferences(String),

    #[error("stored filters reference dimensions that no longer exist: {}", dimensions.join(", "))]
    StaleFilterSchema { dimensions: Vec<String> },

    #[error("saving to {scope} failed: {reason}")]
    PersistenceFailure { scope: String, reason: String },

    #[error("this shared grid is read-only")]
    ReadOnlySession,
}

impl GridError {
    pub fn unknown(id: &str) -> Self {
        GridError::UnknownCharacter { id: id.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_schema_lists_dimensions() {
        let err = GridError::StaleFilterSchema {
            dimensions: vec!["elite".into(), "faction".into()],
        };
        assert_eq!(
            err.to_string(),
            "stored filters reference dimensions that no longer exist: elite, faction"
        );
    }

    #[test]
    fn unknown_character_names_the_id() {
        assert_eq!(GridError::unknown("amiya").to_string(), "unknown character `amiya`");
    }
}
