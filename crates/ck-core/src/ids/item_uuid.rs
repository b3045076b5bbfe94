use serde::{Deserialize, Serialize};

/// Stable identifier of one history entry, assigned at creation.
///
/// Persisted histories carry these in their `uuid` attributes, so the type
/// can also hold ids parsed back from disk. `is_valid` checks the canonical
/// hyphenated form; loaders replace anything else with a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemUuid(String);

impl ItemUuid {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }

    /// Whether the wrapped string is a well-formed uuid.
    pub fn is_valid(&self) -> bool {
        uuid::Uuid::try_parse(&self.0).is_ok()
    }
}

impl Default for ItemUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_valid_and_distinct() {
        let a = ItemUuid::new();
        let b = ItemUuid::new();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parsed_garbage_is_invalid() {
        let id = ItemUuid::from_str("not-a-uuid");
        assert!(!id.is_valid());
    }

    #[test]
    fn test_display_round_trips() {
        let a = ItemUuid::new();
        let b = ItemUuid::from_string(a.to_string());
        assert_eq!(a, b);
    }
}
