//! # Schema Source Model
//!
//! Serde shape of a YAML schema source. A source declares a package, the
//! sources it imports, message types, and extensions of messages declared
//! here or in an import:
//!
//! ```yaml
//! package: xcompat.ext1
//! imports: [base.yaml]
//! extensions:
//!   - extendee: Envelope
//!     fields:
//!       - { name: tag, number: 100, type: string }
//! ```
//!
//! Structural rules (identifier syntax, number bounds, known types) are
//! enforced by the embedded JSON Schema before deserialization; semantic
//! rules by [`crate::compile`].

use extcompat_core::{ExtensionRange, FieldType, Label};
use serde::{Deserialize, Serialize};

/// One schema source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSource {
    pub package: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub messages: Vec<MessageSource>,
    #[serde(default)]
    pub extensions: Vec<ExtendSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSource {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSource>,
    #[serde(default)]
    pub extension_ranges: Vec<ExtensionRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSource {
    pub name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub packed: bool,
}

/// An `extend` block: fields added to another message's extension range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendSource {
    /// Message name, relative to the package or fully qualified with a
    /// leading dot.
    pub extendee: String,
    pub fields: Vec<FieldSource>,
}
