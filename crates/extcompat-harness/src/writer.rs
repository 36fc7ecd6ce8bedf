//! Writer side of a pipeline: build the fixture message with a variant's
//! layout and emit its wire bytes.

use std::io::Write;

use extcompat_core::DynamicMessage;

use crate::error::HarnessError;
use crate::fixture::Fixture;
use crate::variant::Variant;

/// The message a writer of `variant` produces.
pub fn build_message(variant: &Variant, fixture: &Fixture) -> Result<DynamicMessage, HarnessError> {
    let mut message = variant.new_message();
    let populated = fixture.populate(&mut message)?;
    tracing::debug!(variant = variant.name(), fields = ?populated, "populated message");
    Ok(message)
}

/// Encode the writer message into `out`. Returns the number of bytes written.
pub fn write_message(
    variant: &Variant,
    fixture: &Fixture,
    out: &mut impl Write,
) -> Result<usize, HarnessError> {
    let message = build_message(variant, fixture)?;
    let bytes = message.encode_to_vec();
    out.write_all(&bytes)
        .and_then(|()| out.flush())
        .map_err(|e| HarnessError::io(format!("writer '{}' output", variant.name()), e))?;
    tracing::info!(variant = variant.name(), bytes = bytes.len(), "wrote message");
    Ok(bytes.len())
}
