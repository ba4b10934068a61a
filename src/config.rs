//! Generator configuration
//!
//! Every knob has a default matching the reference generator, so running
//! without a config file reproduces its output. A YAML file can override
//! the parser limits, output formatting, and declare extra message types
//! for type-checking.

use crate::error::{Error, Result};
use crate::model::TypeSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration (`--config <file.yaml>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub parser: ParserConfig,

    /// Number of `@index<N>` identifiers declared for `cel.block`
    #[serde(default = "default_block_indices")]
    pub block_indices: usize,

    /// Tag macro-expanded nodes with `^#<macro>#` in rendered trees
    #[serde(default)]
    pub annotate_macro_calls: bool,

    /// Pretty-print JSON output instead of the compact form
    #[serde(default)]
    pub pretty: bool,

    /// Compile tests on the rayon pool (output order is unaffected)
    #[serde(default)]
    pub parallel: bool,

    /// Message types visible to the checker in addition to the
    /// well-known protobuf types
    #[serde(default)]
    pub messages: Vec<MessageConfig>,

    #[serde(default)]
    pub enums: Vec<EnumConfig>,

    /// Register the conformance `TestAllTypes` messages
    #[serde(default = "default_true")]
    pub conformance_types: bool,
}

fn default_true() -> bool {
    true
}

fn default_block_indices() -> usize {
    30
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            block_indices: default_block_indices(),
            annotate_macro_calls: false,
            pretty: false,
            parallel: false,
            messages: Vec::new(),
            enums: Vec::new(),
            conformance_types: true,
        }
    }
}

/// Parser limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    #[serde(default = "default_error_recovery_limit")]
    pub error_recovery_limit: usize,

    #[serde(default = "default_error_recovery_lookahead_limit")]
    pub error_recovery_lookahead_limit: usize,

    /// Accept `.?field`, `[?index]` and `{?key: value}`. Off by default:
    /// the reference suites report these as unsupported syntax.
    #[serde(default)]
    pub optional_syntax: bool,

    /// Accept backtick-quoted field names
    #[serde(default)]
    pub identifier_escape_syntax: bool,
}

fn default_max_recursion_depth() -> usize {
    32
}

fn default_error_recovery_limit() -> usize {
    4
}

fn default_error_recovery_lookahead_limit() -> usize {
    4
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: default_max_recursion_depth(),
            error_recovery_limit: default_error_recovery_limit(),
            error_recovery_lookahead_limit: default_error_recovery_lookahead_limit(),
            optional_syntax: false,
            identifier_escape_syntax: false,
        }
    }
}

/// A message type the checker can resolve and select fields from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Fully qualified name, e.g. `cel.expr.conformance.proto3.TestAllTypes`
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: TypeSpec,
}

/// Enum type; its values type-check as `int`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumConfig {
    pub name: String,

    #[serde(default)]
    pub values: Vec<EnumValueConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValueConfig {
    pub name: String,
    pub number: i64,
}

impl GeneratorConfig {
    /// Load and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let config: GeneratorConfig = serde_norway::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parser.max_recursion_depth == 0 {
            return Err(Error::Config(
                "parser.max_recursion_depth must be positive".into(),
            ));
        }
        if self.block_indices < default_block_indices() {
            return Err(Error::Config(format!(
                "block_indices must be at least {}",
                default_block_indices()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        let names = self
            .messages
            .iter()
            .map(|m| ("message", m.name.as_str()))
            .chain(self.enums.iter().map(|e| ("enum", e.name.as_str())));
        for (what, name) in names {
            if name.is_empty() || name.starts_with('.') {
                return Err(Error::Config(format!("invalid {} name '{}'", what, name)));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate {} '{}'", what, name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.parser.max_recursion_depth, 32);
        assert_eq!(config.parser.error_recovery_limit, 4);
        assert_eq!(config.parser.error_recovery_lookahead_limit, 4);
        assert_eq!(config.block_indices, 30);
        assert!(!config.annotate_macro_calls);
        assert!(config.conformance_types);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: GeneratorConfig = serde_norway::from_str(
            "parallel: true\nmessages:\n  - name: test.Msg\n    fields:\n      - name: id\n        type: {primitive: INT64}\n",
        )
        .unwrap();
        assert!(config.parallel);
        assert_eq!(config.block_indices, 30);
        assert_eq!(config.messages[0].fields[0].ty, TypeSpec::primitive("INT64"));
    }

    #[test]
    fn test_load_rejects_small_block_count() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "block_indices: 3").unwrap();
        let err = GeneratorConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("block_indices"));
    }

    #[test]
    fn test_duplicate_messages_rejected() {
        let mut config = GeneratorConfig::default();
        for _ in 0..2 {
            config.messages.push(MessageConfig {
                name: "a.B".into(),
                fields: vec![],
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_yaml() {
        let config: GeneratorConfig = serde_norway::from_str(
            "conformance_types: false\nenums:\n  - name: a.Color\n    values:\n      - {name: RED, number: 0}\n      - {name: BLUE, number: 2}\n",
        )
        .unwrap();
        assert!(!config.conformance_types);
        assert_eq!(config.enums[0].values[1].number, 2);
    }
}
