//! Stamping configuration
//!
//! Every field has a default, so a configuration file only needs to name
//! what it changes:
//!
//! ```toml
//! fail_on_unresolved = false
//! diagnostic_placeholders = true
//!
//! [evaluator]
//! max_operations = 50000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampError};

/// Top-level stamping settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampConfig {
    /// Abort on the first expression that cannot be resolved
    pub fail_on_unresolved: bool,
    /// Text substituted for unresolved expressions
    pub unresolved_default: Option<String>,
    /// Render `[[${expr}: reason]]` in place of unresolved expressions
    pub diagnostic_placeholders: bool,
    /// Render null values as [`StampConfig::null_default`] instead of
    /// treating them as unresolved
    pub replace_null_values: bool,
    /// Replacement for null values
    pub null_default: String,
    /// Token inside rendered strings that becomes a line break
    pub line_break_placeholder: String,
    /// Expression evaluator limits
    pub evaluator: EvaluatorSettings,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            fail_on_unresolved: true,
            unresolved_default: None,
            diagnostic_placeholders: false,
            replace_null_values: false,
            null_default: String::new(),
            line_break_placeholder: "\n".to_string(),
            evaluator: EvaluatorSettings::default(),
        }
    }
}

impl StampConfig {
    /// Parse settings from a TOML string
    pub fn from_toml_str(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| StampError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Resource limits applied to the expression engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    /// Maximum operations per evaluation
    pub max_operations: u64,
    /// Maximum function call nesting
    pub max_call_levels: usize,
    /// Maximum length of any string value
    pub max_string_size: usize,
    /// Maximum number of array elements
    pub max_array_size: usize,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 64,
            max_string_size: 1_000_000,
            max_array_size: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StampConfig::default();
        assert!(config.fail_on_unresolved);
        assert_eq!(config.unresolved_default, None);
        assert_eq!(config.line_break_placeholder, "\n");
        assert_eq!(config.evaluator.max_call_levels, 64);
    }

    #[test]
    fn test_partial_toml() {
        let config = StampConfig::from_toml_str(
            r#"
            fail_on_unresolved = false
            unresolved_default = "N/A"

            [evaluator]
            max_operations = 500
            "#,
        )
        .unwrap();

        assert!(!config.fail_on_unresolved);
        assert_eq!(config.unresolved_default.as_deref(), Some("N/A"));
        assert_eq!(config.evaluator.max_operations, 500);
        assert_eq!(config.evaluator.max_call_levels, 64);
        assert!(!config.replace_null_values);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(StampConfig::from_toml_str("fail_on_unresolved = 3").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp.toml");
        std::fs::write(&path, "null_default = \"-\"\nreplace_null_values = true\n").unwrap();

        let config = StampConfig::from_file(&path).unwrap();
        assert!(config.replace_null_values);
        assert_eq!(config.null_default, "-");

        assert!(StampConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
