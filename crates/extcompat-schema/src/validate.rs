//! # Source Validation
//!
//! Structural validation of YAML schema sources against the embedded
//! `schema-source.schema.json` (Draft 2020-12). A source that fails here
//! never reaches semantic checking.

use std::fmt;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use crate::source::SchemaSource;

/// The JSON Schema every source must satisfy.
pub const SOURCE_SCHEMA: &str = include_str!("../meta/schema-source.schema.json");

/// Error while reading or validating a schema source.
#[derive(Error, Debug)]
pub enum SchemaValidationError {
    #[error("cannot read schema source '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Not YAML, or YAML outside the JSON-compatible subset.
    #[error("schema source '{source_name}' is not valid YAML: {source}")]
    Yaml {
        source_name: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Every place the document breaks the source schema.
    #[error("schema source '{source_name}' is malformed:\n{}", render(.violations))]
    Malformed {
        source_name: String,
        violations: Vec<Violation>,
    },

    /// Passed the source schema but does not fit the source model.
    #[error("schema source '{source_name}' has an unexpected shape: {source}")]
    Shape {
        source_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedded source schema is unusable: {0}")]
    MetaSchema(String),
}

/// One place a source breaks the source schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer into the source document; empty for the root.
    pub pointer: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.pointer.is_empty() { "/" } else { &self.pointer };
        write!(f, "{at}: {}", self.message)
    }
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validates schema sources against [`SOURCE_SCHEMA`].
///
/// Built once per compiler and reused for every file it loads.
pub struct SourceValidator {
    validator: Validator,
}

impl fmt::Debug for SourceValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceValidator").finish_non_exhaustive()
    }
}

impl SourceValidator {
    pub fn new() -> Result<Self, SchemaValidationError> {
        let schema: Value = serde_json::from_str(SOURCE_SCHEMA)
            .map_err(|e| SchemaValidationError::MetaSchema(e.to_string()))?;
        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        let validator = opts
            .build(&schema)
            .map_err(|e| SchemaValidationError::MetaSchema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Check a parsed document, collecting every violation.
    pub fn validate_value(
        &self,
        document: &Value,
        source_name: &str,
    ) -> Result<(), SchemaValidationError> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(document)
            .map(|e| Violation {
                pointer: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        if violations.is_empty() {
            return Ok(());
        }
        tracing::debug!(source = source_name, count = violations.len(), "source failed validation");
        Err(SchemaValidationError::Malformed {
            source_name: source_name.to_string(),
            violations,
        })
    }

    /// Parse YAML text, validate it, and deserialize the source.
    pub fn parse_source(
        &self,
        text: &str,
        source_name: &str,
    ) -> Result<SchemaSource, SchemaValidationError> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|source| SchemaValidationError::Yaml {
                source_name: source_name.to_string(),
                source,
            })?;
        self.validate_value(&document, source_name)?;
        serde_json::from_value(document).map_err(|source| SchemaValidationError::Shape {
            source_name: source_name.to_string(),
            source,
        })
    }

    /// Read, validate and deserialize a source file.
    pub fn load_source(
        &self,
        path: &Path,
        source_name: &str,
    ) -> Result<SchemaSource, SchemaValidationError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaValidationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.parse_source(&text, source_name)
    }
}
