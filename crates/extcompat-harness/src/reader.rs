//! # Reader Verification
//!
//! The reader side of a pipeline decodes the whole input with its variant's
//! layout and then checks what it got:
//!
//! 1. Every regular field equals its fixture value.
//! 2. Every extension the reader knows is absent or equals its fixture value.
//! 3. Re-encoding the decoded message reproduces the input exactly, which
//!    proves unknown fields were preserved rather than dropped.
//! 4. When the writer variant is known, presence is strict: a field the
//!    reader knows is present exactly when the writer knows it too, and the
//!    unknown-field set holds one record for each field the writer set that
//!    the reader cannot name.
//!
//! A decode failure and a failed check are distinct outcomes with distinct
//! exit codes; see [`ReadError::exit_code`].

use std::collections::BTreeMap;
use std::io::Read;

use extcompat_core::{ContentDigest, DynamicMessage, FieldDescriptor, Value, WireError};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::error::{HarnessError, EXIT_DECODE, EXIT_USAGE, EXIT_VERIFY};
use crate::fixture::Fixture;
use crate::variant::Variant;
use crate::writer::build_message;

/// Error from the reader side of a pipeline.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("reader '{variant}' could not read input: {source}")]
    Io {
        variant: String,
        #[source]
        source: std::io::Error,
    },

    /// The input is not a valid message for the reader's layout.
    #[error("reader '{variant}' failed to decode {bytes} bytes: {source}")]
    Decode {
        variant: String,
        bytes: usize,
        #[source]
        source: WireError,
    },

    /// The input decoded but its contents are wrong.
    #[error("reader '{}' verification failed: {}", .report.reader, .report.mismatches.join("; "))]
    Verification { report: Box<ReadReport> },

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl ReadError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Io { .. } | Self::Harness(_) => EXIT_USAGE,
            Self::Decode { .. } => EXIT_DECODE,
            Self::Verification { .. } => EXIT_VERIFY,
        }
    }
}

/// Presence and value of one extension the reader knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionStatus {
    pub present: bool,
    /// The stored value, or the type default when absent.
    pub value: Json,
}

/// What a reader saw. Printed as JSON on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReport {
    pub reader: String,
    /// Digest of the binding the reader decoded with.
    pub binding: ContentDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
    pub message: String,
    pub bytes: usize,
    /// Regular fields by short name; absent fields show their default.
    pub fields: BTreeMap<String, Json>,
    /// Known extensions by full name.
    pub extensions: BTreeMap<String, ExtensionStatus>,
    /// Number of unknown-field records preserved.
    pub unknown_fields: usize,
    /// Distinct unknown field numbers, ascending.
    pub unknown_numbers: Vec<u32>,
    pub reencode_identical: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<String>,
}

impl ReadReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Read the whole of `input`.
pub fn read_input(reader: &Variant, input: &mut impl Read) -> Result<Vec<u8>, ReadError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|source| ReadError::Io {
            variant: reader.name().to_string(),
            source,
        })?;
    Ok(bytes)
}

/// Decode `input` with the reader's layout and verify it.
pub fn verify(
    reader: &Variant,
    fixture: &Fixture,
    input: &[u8],
    writer: Option<&Variant>,
) -> Result<ReadReport, ReadError> {
    let message =
        DynamicMessage::decode(std::sync::Arc::clone(reader.layout()), input).map_err(|source| {
            ReadError::Decode {
                variant: reader.name().to_string(),
                bytes: input.len(),
                source,
            }
        })?;

    let mut report = describe(reader, &message, input)?;
    report.writer = writer.map(|w| w.name().to_string());
    let mut mismatches = check_values(reader, fixture, &message)?;
    if !report.reencode_identical {
        mismatches.push(format!(
            "re-encoding produced {} bytes that differ from the {} input bytes",
            message.encoded_len(),
            input.len()
        ));
    }
    if let Some(writer) = writer {
        mismatches.extend(check_presence(reader, writer, fixture, &message)?);
    }
    report.mismatches = mismatches;

    tracing::info!(
        reader = reader.name(),
        writer = report.writer.as_deref().unwrap_or("-"),
        bytes = input.len(),
        unknown = report.unknown_fields,
        "decoded message"
    );
    if report.is_ok() {
        Ok(report)
    } else {
        for mismatch in &report.mismatches {
            tracing::warn!(reader = reader.name(), "{mismatch}");
        }
        Err(ReadError::Verification {
            report: Box::new(report),
        })
    }
}

fn describe(reader: &Variant, message: &DynamicMessage, input: &[u8]) -> Result<ReadReport, ReadError> {
    let layout = reader.layout();
    let mut fields = BTreeMap::new();
    for field in layout.regular_fields() {
        let value = message
            .get_or_default(field.lookup_name())
            .map_err(HarnessError::from)?;
        fields.insert(field.name.clone(), value.to_json());
    }
    let mut extensions = BTreeMap::new();
    for field in layout.extensions() {
        let value = message
            .get_or_default(field.lookup_name())
            .map_err(HarnessError::from)?;
        extensions.insert(
            field.full_name.clone(),
            ExtensionStatus {
                present: message.has(field.lookup_name()),
                value: value.to_json(),
            },
        );
    }
    let unknown = message.unknown_fields();
    Ok(ReadReport {
        reader: reader.name().to_string(),
        binding: reader.digest().clone(),
        writer: None,
        message: layout.full_name().to_string(),
        bytes: input.len(),
        fields,
        extensions,
        unknown_fields: unknown.len(),
        unknown_numbers: unknown.numbers(),
        reencode_identical: message.encode_to_vec() == input,
        mismatches: Vec::new(),
    })
}

/// Checks 1 and 2: regular fields equal the fixture, known extensions are
/// absent or equal the fixture.
fn check_values(
    reader: &Variant,
    fixture: &Fixture,
    message: &DynamicMessage,
) -> Result<Vec<String>, ReadError> {
    let mut mismatches = Vec::new();
    for field in reader.layout().fields() {
        let expected = fixture.value_for(field).map_err(HarnessError::from)?;
        let actual = message.get(field.lookup_name());
        match (field.is_extension(), expected, actual) {
            (_, Some(expected), Some(actual)) if *actual != expected => {
                mismatches.push(value_mismatch(field, &expected, Some(actual)));
            }
            (false, Some(expected), None) => {
                mismatches.push(value_mismatch(field, &expected, None));
            }
            (true, None, Some(actual)) => mismatches.push(format!(
                "extension '{}' is set to {} but has no fixture value",
                field.full_name,
                actual.to_json()
            )),
            _ => {}
        }
    }
    Ok(mismatches)
}

/// Check 4: strict presence against the writer's layout.
fn check_presence(
    reader: &Variant,
    writer: &Variant,
    fixture: &Fixture,
    message: &DynamicMessage,
) -> Result<Vec<String>, ReadError> {
    let written = build_message(writer, fixture)?;
    let mut mismatches = Vec::new();
    let mut expected_unknown = 0;

    for (field, value) in written.present_fields() {
        if reader.knows(field.number, field.lookup_name()) {
            continue;
        }
        expected_unknown += record_count(field, value);
    }
    for field in reader.layout().fields() {
        let written_by_writer = written.has(field.lookup_name())
            && writer.knows(field.number, field.lookup_name());
        let present = message.has(field.lookup_name());
        if present != written_by_writer {
            mismatches.push(format!(
                "field '{}' is {} but writer '{}' {} it",
                field.lookup_name(),
                if present { "present" } else { "absent" },
                writer.name(),
                if written_by_writer { "sets" } else { "does not set" }
            ));
        }
    }
    let unknown = message.unknown_fields().len();
    if unknown != expected_unknown {
        mismatches.push(format!(
            "expected {expected_unknown} unknown field record(s) from writer '{}', found {unknown}",
            writer.name()
        ));
    }
    Ok(mismatches)
}

/// Wire records one populated field occupies.
fn record_count(field: &FieldDescriptor, value: &Value) -> usize {
    match value {
        Value::List(items) if !field.packed => items.len(),
        _ => 1,
    }
}

fn value_mismatch(field: &FieldDescriptor, expected: &Value, actual: Option<&Value>) -> String {
    match actual {
        Some(actual) => format!(
            "field '{}': expected {}, got {}",
            field.lookup_name(),
            expected.to_json(),
            actual.to_json()
        ),
        None => format!(
            "field '{}': expected {}, but it is absent",
            field.lookup_name(),
            expected.to_json()
        ),
    }
}
