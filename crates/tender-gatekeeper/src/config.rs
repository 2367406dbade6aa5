//! Gatekeeper configuration

use serde::{Deserialize, Serialize};

/// Configuration for draft normalisation and validation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Join arrays of scalars with `list_separator` when a text field gets a list
    pub join_text_lists: bool,

    /// Separator used when joining list items into text
    pub list_separator: String,

    /// Accept yes/no synonyms ("allowed", "not permitted", booleans) for yes/no choices
    pub lenient_choices: bool,

    /// Treat unknown keys in model output as a violation instead of ignoring them
    pub reject_unknown_keys: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            join_text_lists: true,
            list_separator: "; ".to_string(),
            lenient_choices: true,
            reject_unknown_keys: false,
        }
    }
}

impl ValidationConfig {
    /// Create a permissive configuration (maximum coercion)
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Create a strict configuration (no coercion, unknown keys rejected)
    pub fn strict() -> Self {
        Self {
            join_text_lists: false,
            list_separator: "; ".to_string(),
            lenient_choices: false,
            reject_unknown_keys: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ValidationConfig::default();
        assert!(config.join_text_lists);
        assert!(config.lenient_choices);
        assert!(!config.reject_unknown_keys);
    }

    #[test]
    fn test_strict_config() {
        let config = ValidationConfig::strict();
        assert!(!config.join_text_lists);
        assert!(config.reject_unknown_keys);
    }
}
