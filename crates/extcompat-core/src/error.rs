//! # Error Types: Structured Error Hierarchy
//!
//! Defines the error types used throughout extcompat. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Wire errors name the field number and, where known, the field name.
//! - Descriptor errors carry both sides of a conflict.
//! - Field errors carry the expected vs actual value kind.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error while decoding wire bytes.
#[derive(Error, Debug)]
pub enum WireError {
    /// Low-level varint or key decoding failed.
    #[error("malformed wire data: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The buffer ended before a value was complete.
    #[error("truncated value for field {number}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Field number being decoded.
        number: u32,
        /// Bytes the value declares.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string field held bytes that are not UTF-8.
    #[error("field '{field}' contains invalid UTF-8")]
    InvalidUtf8 {
        /// Field name.
        field: String,
    },

    /// A `required` field was absent after a full decode.
    #[error("missing required field '{field}' in {message}")]
    MissingRequired {
        /// Message full name.
        message: String,
        /// Field name.
        field: String,
    },

    /// An end-group marker appeared without a matching start group.
    #[error("unexpected end group for field {number}")]
    UnexpectedEndGroup {
        /// Field number on the end-group key.
        number: u32,
    },

    /// A group was opened but never closed.
    #[error("unterminated group for field {number}")]
    UnterminatedGroup {
        /// Field number of the open group.
        number: u32,
    },

    /// Group nesting exceeded the decoder's limit.
    #[error("group nesting exceeds limit of {limit}")]
    RecursionLimit {
        /// The configured limit.
        limit: usize,
    },
}

/// Error when reading or assigning a field on a dynamic message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// No field or extension with this name is known to the message layout.
    #[error("{message} has no field or extension named '{name}'")]
    UnknownField {
        /// Message full name.
        message: String,
        /// Requested field name.
        name: String,
    },

    /// The supplied value does not match the field's declared type.
    #[error("field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared type or label.
        expected: String,
        /// Kind of the supplied value.
        actual: String,
    },
}

/// Error when building or querying a descriptor pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// Two files declare the same message.
    #[error("message '{name}' is declared more than once")]
    DuplicateMessage {
        /// Fully qualified message name.
        name: String,
    },

    /// A file with this name was already added to the pool.
    #[error("file '{name}' is already in the pool")]
    DuplicateFile {
        /// File name.
        name: String,
    },

    /// A file depends on a file that has not been added yet.
    #[error("file '{file}' depends on '{dependency}', which is not in the pool")]
    MissingDependency {
        /// Dependent file.
        file: String,
        /// Missing dependency.
        dependency: String,
    },

    /// An extension names a message that does not exist.
    #[error("extension '{extension}' extends unknown message '{extendee}'")]
    UnknownExtendee {
        /// Extension full name.
        extension: String,
        /// Referenced message name.
        extendee: String,
    },

    /// An extension number lies outside every declared extension range.
    #[error("extension '{extension}' uses number {number}, outside the extension ranges of {extendee}")]
    OutOfRange {
        /// Extension full name.
        extension: String,
        /// Extendee message name.
        extendee: String,
        /// Field number.
        number: u32,
    },

    /// Two extensions of the same message share a field number.
    #[error("extensions '{existing}' and '{conflicting}' both use number {number} on {extendee}")]
    ExtensionConflict {
        /// Extendee message name.
        extendee: String,
        /// Field number.
        number: u32,
        /// Extension already registered.
        existing: String,
        /// Extension being added.
        conflicting: String,
    },

    /// A message was requested that the pool does not contain.
    #[error("message '{name}' not found in pool")]
    MessageNotFound {
        /// Requested message name.
        name: String,
    },
}
