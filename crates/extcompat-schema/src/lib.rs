//! # extcompat-schema: Schema Compiler
//!
//! Compiles YAML schema sources into digest-stamped descriptor bindings.
//!
//! ## Sources (`source`, `validate`)
//!
//! A source declares a package, its imports, messages with extension
//! ranges, and `extend` blocks. Every source is validated against the
//! embedded `schema-source.schema.json` before it is deserialized, so a
//! typo in a key or an unknown field type is reported with its path.
//!
//! ## Compilation (`compile`)
//!
//! [`SchemaCompiler`] resolves imports through an ordered list of include
//! paths, applies the semantic rules JSON Schema cannot express, and links
//! the closure through [`extcompat_core::DescriptorPool`].
//!
//! ## Bindings (`bindings`)
//!
//! [`CompiledSchema`] is the persisted closure for one root source,
//! written as `<stem>.desc.json` and verified against its SHA-256 digest
//! whenever it is loaded.
//!
//! ## Crate Policy
//!
//! - Depends only on `extcompat-core` internally.
//! - A binding that fails digest verification is never linked.

pub mod bindings;
pub mod compile;
pub mod source;
pub mod validate;

pub use bindings::{binding_file_name, BindingError, CompiledSchema, BINDING_SUFFIX};
pub use compile::{CompileError, SchemaCompiler};
pub use source::{ExtendSource, FieldSource, MessageSource, SchemaSource};
pub use validate::{SchemaValidationError, SourceValidator, Violation};
