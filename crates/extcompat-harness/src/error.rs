//! Harness error types and process exit codes.

use extcompat_core::{DescriptorError, FieldError};
use extcompat_schema::{BindingError, CompileError};
use thiserror::Error;

/// Success.
pub const EXIT_OK: u8 = 0;
/// Usage, configuration or IO error.
pub const EXIT_USAGE: u8 = 1;
/// The reader could not decode its input.
pub const EXIT_DECODE: u8 = 2;
/// The reader decoded its input but the contents were wrong.
pub const EXIT_VERIFY: u8 = 3;

/// Error while setting up or running the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("config '{path}': {reason}")]
    Config { path: String, reason: String },

    #[error("unknown variant '{name}' (known: {known})")]
    UnknownVariant { name: String, known: String },

    #[error("fixture '{path}': {reason}")]
    Fixture { path: String, reason: String },

    #[error("variant '{variant}': {source}")]
    Binding {
        variant: String,
        #[source]
        source: BindingError,
    },

    #[error("variant '{variant}': {source}")]
    Descriptor {
        variant: String,
        #[source]
        source: DescriptorError,
    },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Every setup failure maps to the usage exit code.
    pub fn exit_code(&self) -> u8 {
        EXIT_USAGE
    }
}
